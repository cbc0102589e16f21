use super::args::*;
use crate::exit_codes::SUCCESS;

pub mod authorize;
pub mod decode;
pub mod jwks;
pub mod policy;

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Authorize(args) => authorize::cmd_authorize(args).await,
        Command::Policy(args) => policy::cmd_policy(args),
        Command::Decode(args) => decode::cmd_decode(args),
        Command::Jwks(args) => Ok(jwks::cmd_jwks(args).await),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(SUCCESS)
        }
    }
}
