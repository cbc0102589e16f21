//! `gatepost authorize` - Decide a gateway event.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use gatepost_authz::{
    Authorizer, AuthorizerConfig, AuthorizerEvent, AuthzError, KeySet, StaticKeySource,
    UNAUTHORIZED,
};

use crate::exit_codes::{self, CONFIG_ERROR, SUCCESS};

#[derive(Args, Debug)]
pub struct AuthorizeArgs {
    /// Event JSON file (`type`, `authorizationToken`, `methodArn`), or `-` for stdin
    #[arg(long)]
    pub event: PathBuf,

    /// Config file (YAML). Environment variables are used when omitted
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Trusted pool id; overrides the config file and environment
    #[arg(long)]
    pub user_pool_id: Option<String>,

    /// Verify against a local JWKS file instead of fetching from the issuer
    #[arg(long)]
    pub jwks: Option<PathBuf>,

    /// Pretty-print the response
    #[arg(long)]
    pub pretty: bool,
}

pub async fn cmd_authorize(args: AuthorizeArgs) -> Result<i32> {
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(CONFIG_ERROR);
        }
    };

    let inputs = read_event(&args).and_then(|event| Ok((event, read_pinned_keys(&args)?)));
    let (event, pinned) = match inputs {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("error: {e:#}");
            return Ok(CONFIG_ERROR);
        }
    };

    let authorizer = match pinned {
        Some(keys) => Authorizer::new(config, Arc::new(StaticKeySource::new(keys))),
        None => Authorizer::from_config(config),
    };
    let authorizer = match authorizer {
        Ok(authorizer) => authorizer,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(exit_codes::from_error(&e));
        }
    };

    match authorizer.authorize(&event).await {
        Ok(response) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&response)?
            } else {
                serde_json::to_string(&response)?
            };
            println!("{json}");
            Ok(SUCCESS)
        }
        Err(rejection) => {
            eprintln!("{UNAUTHORIZED}");
            Ok(exit_codes::from_error(&rejection.error))
        }
    }
}

fn load_config(args: &AuthorizeArgs) -> Result<AuthorizerConfig, AuthzError> {
    let mut config = match (&args.config, &args.user_pool_id) {
        (Some(path), _) => AuthorizerConfig::from_file(path)?,
        (None, Some(pool)) => AuthorizerConfig::new(pool.as_str()),
        (None, None) => AuthorizerConfig::from_env()?,
    };
    if let Some(pool) = &args.user_pool_id {
        config.user_pool_id = pool.clone();
    }
    config.validate()?;
    Ok(config)
}

fn read_pinned_keys(args: &AuthorizeArgs) -> Result<Option<KeySet>> {
    let Some(path) = &args.jwks else {
        return Ok(None);
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read JWKS file: {}", path.display()))?;
    let keys = KeySet::from_json(&json)
        .with_context(|| format!("failed to parse JWKS file: {}", path.display()))?;
    tracing::debug!(keys = keys.len(), path = %path.display(), "using pinned key set");
    Ok(Some(keys))
}

fn read_event(args: &AuthorizeArgs) -> Result<AuthorizerEvent> {
    let raw = if args.event.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&args.event)
            .with_context(|| format!("failed to read event file: {}", args.event.display()))?
    };
    serde_json::from_str(&raw).context("failed to parse event JSON")
}
