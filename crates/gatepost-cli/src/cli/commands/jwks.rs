//! `gatepost jwks` - Fetch an issuer's key set and list the usable keys.

use std::time::Duration;

use clap::Args;

use gatepost_authz::{Issuer, JwksClient, KeySet};

use crate::exit_codes::{self, CONFIG_ERROR, SUCCESS};

#[derive(Args, Debug)]
pub struct JwksArgs {
    /// Issuer URL (the token's `iss` claim)
    #[arg(long)]
    pub issuer: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 5)]
    pub timeout: u64,
}

pub async fn cmd_jwks(args: JwksArgs) -> i32 {
    let issuer = match Issuer::parse(&args.issuer) {
        Ok(issuer) => issuer,
        Err(e) => {
            eprintln!("error: {e}");
            return CONFIG_ERROR;
        }
    };
    let client = match JwksClient::new(Duration::from_secs(args.timeout)) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_codes::from_error(&e);
        }
    };

    let jwks = match client.fetch_jwks(&issuer).await {
        Ok(jwks) => jwks,
        Err(e) => {
            eprintln!("error: {e}");
            return exit_codes::from_error(&e);
        }
    };
    let keys = KeySet::from_jwks(&jwks);

    println!("{}", issuer.jwks_url());
    for kid in keys.kids() {
        if let Some(key) = keys.get(kid) {
            let algorithms: Vec<String> =
                key.algorithms().iter().map(|alg| format!("{alg:?}")).collect();
            println!("  {kid}\t{}", algorithms.join(","));
        }
    }
    let skipped = jwks.keys.len().saturating_sub(keys.len());
    if skipped > 0 {
        println!("  ({skipped} unusable entries skipped)");
    }
    SUCCESS
}
