//! Gateway authorization policies.
//!
//! [`PolicyBuilder`] collects allow and deny entries for one principal and renders them into
//! an [`AuthPolicy`]. Rendering rules:
//!
//! - entries without conditions are merged into one statement per effect
//! - each conditioned entry gets its own statement
//! - per effect, conditioned statements come first (in insertion order), then the merged one
//! - allow statements precede deny statements

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, AuthzResult};

/// Policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// The single action every statement grants or denies.
pub const INVOKE_ACTION: &str = "execute-api:Invoke";

const ARN_PREFIX: &str = "arn:aws:execute-api";
const RESOURCE_PATH_PATTERN: &str = "^[/.a-zA-Z0-9-*]+$";

/// Wildcard used for unspecified scope fields, verbs and paths.
pub const WILDCARD: &str = "*";

fn resource_path_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(RESOURCE_PATH_PATTERN).expect("static resource path pattern"))
}

/// Condition block attached to a statement.
pub type Conditions = serde_json::Map<String, serde_json::Value>;

/// HTTP verbs a statement can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpVerb {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "HEAD")]
    Head,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "OPTIONS")]
    Options,
    #[serde(rename = "*")]
    All,
}

impl HttpVerb {
    pub const ALL_VERBS: [HttpVerb; 8] = [
        HttpVerb::Get,
        HttpVerb::Post,
        HttpVerb::Put,
        HttpVerb::Patch,
        HttpVerb::Head,
        HttpVerb::Delete,
        HttpVerb::Options,
        HttpVerb::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVerb::Get => "GET",
            HttpVerb::Post => "POST",
            HttpVerb::Put => "PUT",
            HttpVerb::Patch => "PATCH",
            HttpVerb::Head => "HEAD",
            HttpVerb::Delete => "DELETE",
            HttpVerb::Options => "OPTIONS",
            HttpVerb::All => WILDCARD,
        }
    }
}

impl FromStr for HttpVerb {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpVerb::ALL_VERBS
            .into_iter()
            .find(|verb| verb.as_str() == s)
            .ok_or_else(|| AuthzError::InvalidVerb { verb: s.to_string() })
    }
}

impl AsRef<str> for HttpVerb {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The API surface a policy applies to. Unset fields are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScope {
    pub region: String,
    pub account_id: String,
    pub api_id: String,
    pub stage: String,
}

impl Default for ApiScope {
    fn default() -> Self {
        Self {
            region: WILDCARD.to_string(),
            account_id: WILDCARD.to_string(),
            api_id: WILDCARD.to_string(),
            stage: WILDCARD.to_string(),
        }
    }
}

impl ApiScope {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = or_wildcard(region.into());
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = or_wildcard(account_id.into());
        self
    }

    pub fn with_api_id(mut self, api_id: impl Into<String>) -> Self {
        self.api_id = or_wildcard(api_id.into());
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = or_wildcard(stage.into());
        self
    }

    /// Resource identifier for `verb` on `path` (leading `/` already removed).
    fn resource_arn(&self, verb: HttpVerb, path: &str) -> String {
        format!(
            "{}:{}:{}:{}/{}/{}/{}",
            ARN_PREFIX, self.region, self.account_id, self.api_id, self.stage, verb, path
        )
    }
}

fn or_wildcard(value: String) -> String {
    if value.is_empty() {
        WILDCARD.to_string()
    } else {
        value
    }
}

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// One policy statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Effect")]
    pub effect: Effect,
    #[serde(rename = "Resource")]
    pub resource: Vec<String>,
    #[serde(rename = "Condition", default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Conditions>,
}

impl Statement {
    fn new(effect: Effect, resource: Vec<String>, condition: Option<Conditions>) -> Self {
        Self {
            action: INVOKE_ACTION.to_string(),
            effect,
            resource,
            condition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Statement")]
    pub statement: Vec<Statement>,
}

/// A rendered policy for one principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPolicy {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
}

impl AuthPolicy {
    /// True if any statement has the given effect.
    pub fn has_effect(&self, effect: Effect) -> bool {
        self.policy_document
            .statement
            .iter()
            .any(|s| s.effect == effect)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    resource_arn: String,
    conditions: Option<Conditions>,
}

/// Accumulates statements for a single principal.
#[derive(Debug, Clone)]
pub struct PolicyBuilder {
    principal_id: String,
    scope: ApiScope,
    allow: Vec<Entry>,
    deny: Vec<Entry>,
}

impl PolicyBuilder {
    pub fn new(principal_id: impl Into<String>, scope: ApiScope) -> Self {
        Self {
            principal_id: principal_id.into(),
            scope,
            allow: Vec::new(),
            deny: Vec::new(),
        }
    }

    pub fn principal_id(&self) -> &str {
        &self.principal_id
    }

    pub fn scope(&self) -> &ApiScope {
        &self.scope
    }

    pub fn allow(&mut self, verb: HttpVerb, path: &str) -> AuthzResult<&mut Self> {
        self.add(Effect::Allow, verb, path, None)
    }

    pub fn deny(&mut self, verb: HttpVerb, path: &str) -> AuthzResult<&mut Self> {
        self.add(Effect::Deny, verb, path, None)
    }

    pub fn allow_with_conditions(
        &mut self,
        verb: HttpVerb,
        path: &str,
        conditions: Conditions,
    ) -> AuthzResult<&mut Self> {
        self.add(Effect::Allow, verb, path, Some(conditions))
    }

    pub fn deny_with_conditions(
        &mut self,
        verb: HttpVerb,
        path: &str,
        conditions: Conditions,
    ) -> AuthzResult<&mut Self> {
        self.add(Effect::Deny, verb, path, Some(conditions))
    }

    pub fn allow_all(&mut self) -> &mut Self {
        self.push_wildcard(Effect::Allow)
    }

    pub fn deny_all(&mut self) -> &mut Self {
        self.push_wildcard(Effect::Deny)
    }

    /// Render the document. The builder is left untouched, so repeated calls agree.
    pub fn build(&self) -> AuthzResult<AuthPolicy> {
        if self.allow.is_empty() && self.deny.is_empty() {
            return Err(AuthzError::EmptyPolicy);
        }

        let mut statement = statements_for(Effect::Allow, &self.allow);
        statement.extend(statements_for(Effect::Deny, &self.deny));

        Ok(AuthPolicy {
            principal_id: self.principal_id.clone(),
            policy_document: PolicyDocument {
                version: POLICY_VERSION.to_string(),
                statement,
            },
        })
    }

    fn add(
        &mut self,
        effect: Effect,
        verb: HttpVerb,
        path: &str,
        conditions: Option<Conditions>,
    ) -> AuthzResult<&mut Self> {
        if !resource_path_regex().is_match(path) {
            return Err(AuthzError::InvalidResourcePath {
                path: path.to_string(),
            });
        }
        let path = path.strip_prefix('/').unwrap_or(path);

        let entry = Entry {
            resource_arn: self.scope.resource_arn(verb, path),
            conditions: conditions.filter(|c| !c.is_empty()),
        };
        match effect {
            Effect::Allow => self.allow.push(entry),
            Effect::Deny => self.deny.push(entry),
        }
        Ok(self)
    }

    fn push_wildcard(&mut self, effect: Effect) -> &mut Self {
        let entry = Entry {
            resource_arn: self.scope.resource_arn(HttpVerb::All, WILDCARD),
            conditions: None,
        };
        match effect {
            Effect::Allow => self.allow.push(entry),
            Effect::Deny => self.deny.push(entry),
        }
        self
    }
}

fn statements_for(effect: Effect, entries: &[Entry]) -> Vec<Statement> {
    let mut statements = Vec::new();
    let mut merged = Vec::new();

    for entry in entries {
        match &entry.conditions {
            Some(conditions) => statements.push(Statement::new(
                effect,
                vec![entry.resource_arn.clone()],
                Some(conditions.clone()),
            )),
            None => merged.push(entry.resource_arn.clone()),
        }
    }

    if !merged.is_empty() {
        statements.push(Statement::new(effect, merged, None));
    }
    statements
}
