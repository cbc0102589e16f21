//! Gateway-facing request and response shapes.

use serde::{Deserialize, Serialize};

use crate::policy::{AuthPolicy, PolicyDocument};
use crate::validate::VerifiedIdentity;

/// Token authorizer request as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerEvent {
    /// `TOKEN` for token authorizers.
    #[serde(rename = "type", default)]
    pub event_type: String,

    /// `Bearer <token>`.
    #[serde(default)]
    pub authorization_token: String,

    pub method_arn: String,
}

impl AuthorizerEvent {
    pub fn new(authorization_token: impl Into<String>, method_arn: impl Into<String>) -> Self {
        Self {
            event_type: "TOKEN".to_string(),
            authorization_token: authorization_token.into(),
            method_arn: method_arn.into(),
        }
    }
}

/// Identity attached to a decision for downstream handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Reserved; always empty.
    #[serde(default)]
    pub role: String,
    pub user_pool_id: String,
}

impl From<&VerifiedIdentity> for IdentityContext {
    fn from(identity: &VerifiedIdentity) -> Self {
        Self {
            sub: identity.subject.clone(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: String::new(),
            user_pool_id: identity.pool_id.clone(),
        }
    }
}

/// Decision returned to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizerResponse {
    pub principal_id: String,
    pub policy_document: PolicyDocument,
    pub context: IdentityContext,
}

impl AuthorizerResponse {
    pub fn new(policy: AuthPolicy, context: IdentityContext) -> Self {
        Self {
            principal_id: policy.principal_id,
            policy_document: policy.policy_document,
            context,
        }
    }
}
