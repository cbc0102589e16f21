//! Inbound method identifiers.
//!
//! `arn:aws:execute-api:{region}:{account}:{apiId}/{stage}/{verb}/{resource...}`

use std::fmt;
use std::str::FromStr;

use crate::error::{AuthzError, AuthzResult};
use crate::policy::ApiScope;

/// A parsed method ARN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodArn {
    pub region: String,
    pub account_id: String,
    pub api_id: String,
    pub stage: String,
    /// Verb of the invoked method, if present.
    pub verb: Option<String>,
    /// Invoked resource path, always starting with `/`.
    pub resource: String,
}

impl MethodArn {
    pub fn parse(arn: &str) -> AuthzResult<Self> {
        let invalid = |reason: &str| AuthzError::InvalidMethodArn {
            arn: arn.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = arn.splitn(6, ':').collect();
        if fields.len() < 6 {
            return Err(invalid("expected six ':'-separated fields"));
        }
        if fields[0] != "arn" {
            return Err(invalid("missing arn prefix"));
        }

        let mut path = fields[5].split('/');
        let api_id = path.next().unwrap_or_default();
        let stage = path.next().unwrap_or_default();
        if api_id.is_empty() {
            return Err(invalid("missing API id"));
        }
        if stage.is_empty() {
            return Err(invalid("missing stage"));
        }

        let verb = path.next().filter(|v| !v.is_empty()).map(str::to_string);
        let rest: Vec<&str> = path.collect();

        Ok(Self {
            region: fields[3].to_string(),
            account_id: fields[4].to_string(),
            api_id: api_id.to_string(),
            stage: stage.to_string(),
            verb,
            resource: format!("/{}", rest.join("/")),
        })
    }

    /// Scope for policies covering this API and stage.
    pub fn scope(&self) -> ApiScope {
        ApiScope::default()
            .with_region(self.region.as_str())
            .with_account_id(self.account_id.as_str())
            .with_api_id(self.api_id.as_str())
            .with_stage(self.stage.as_str())
    }
}

impl FromStr for MethodArn {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MethodArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:aws:execute-api:{}:{}:{}/{}/{}{}",
            self.region,
            self.account_id,
            self.api_id,
            self.stage,
            self.verb.as_deref().unwrap_or("*"),
            self.resource
        )
    }
}
