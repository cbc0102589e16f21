use clap::{Parser, Subcommand};

use super::commands::{authorize, decode, jwks, policy};

#[derive(Parser)]
#[command(
    name = "gatepost",
    version,
    about = "Bearer-token authorizer: verify identity tokens and emit gateway policies"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the authorizer over a gateway event
    Authorize(authorize::AuthorizeArgs),
    /// Build a policy document from allow/deny rules
    Policy(policy::PolicyArgs),
    /// Decode a token without verifying it
    Decode(decode::DecodeArgs),
    /// Fetch and list an issuer's signing keys
    Jwks(jwks::JwksArgs),
    Version,
}
