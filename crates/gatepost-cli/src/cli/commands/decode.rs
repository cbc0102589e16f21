//! `gatepost decode` - Show a token's header and claims without verifying it.

use anyhow::Result;
use clap::Args;

use gatepost_authz::decode_unverified;

use crate::exit_codes::{self, SUCCESS};

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Token or `Bearer <token>` credential
    #[arg(long)]
    pub token: String,
}

pub fn cmd_decode(args: DecodeArgs) -> Result<i32> {
    let decoded = match decode_unverified(&args.token) {
        Ok(decoded) => decoded,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(exit_codes::from_error(&e));
        }
    };

    let issuer = decoded.issuer().ok();
    let output = serde_json::json!({
        "header": decoded.header,
        "claims": decoded.claims,
        "pool_id": issuer.as_ref().map(|i| i.pool_id()),
        "jwks_url": issuer.as_ref().map(|i| i.jwks_url()),
        "verified": false,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(SUCCESS)
}
