//! `gatepost policy` - Render a policy document from allow/deny rules.

use anyhow::Result;
use clap::Args;

use gatepost_authz::{ApiScope, AuthzError, AuthzResult, HttpVerb, MethodArn, PolicyBuilder};

use crate::exit_codes::{self, SUCCESS};

#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Principal the policy is issued for (token subject)
    #[arg(long)]
    pub principal: String,

    /// Allow rule, e.g. `GET:/users/*`; repeatable
    #[arg(long = "allow", value_name = "VERB:PATH")]
    pub allow: Vec<String>,

    /// Deny rule, e.g. `DELETE:/users/*`; repeatable
    #[arg(long = "deny", value_name = "VERB:PATH")]
    pub deny: Vec<String>,

    /// Scope the policy to the API and stage of this method ARN (default: all wildcards)
    #[arg(long)]
    pub method_arn: Option<String>,

    /// Pretty-print the document
    #[arg(long)]
    pub pretty: bool,
}

pub fn cmd_policy(args: PolicyArgs) -> Result<i32> {
    match build_policy(&args) {
        Ok(policy) => {
            let json = if args.pretty {
                serde_json::to_string_pretty(&policy)?
            } else {
                serde_json::to_string(&policy)?
            };
            println!("{json}");
            Ok(SUCCESS)
        }
        Err(e) => {
            eprintln!("error: {e}");
            Ok(exit_codes::from_error(&e))
        }
    }
}

fn build_policy(args: &PolicyArgs) -> AuthzResult<gatepost_authz::AuthPolicy> {
    let scope = match &args.method_arn {
        Some(arn) => MethodArn::parse(arn)?.scope(),
        None => ApiScope::default(),
    };

    let mut builder = PolicyBuilder::new(args.principal.as_str(), scope);
    for rule in &args.allow {
        let (verb, path) = parse_rule(rule)?;
        builder.allow(verb, path)?;
    }
    for rule in &args.deny {
        let (verb, path) = parse_rule(rule)?;
        builder.deny(verb, path)?;
    }
    builder.build()
}

/// Split `VERB:PATH`. A rule without `:` is rejected as a bad verb.
fn parse_rule(rule: &str) -> AuthzResult<(HttpVerb, &str)> {
    let (verb, path) = rule.split_once(':').ok_or_else(|| AuthzError::InvalidVerb {
        verb: rule.to_string(),
    })?;
    Ok((verb.parse()?, path))
}
