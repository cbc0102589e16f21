//! Request orchestration: parse, resolve keys, validate, build policy.
//!
//! ```text
//! Received -> Parsed -> KeysResolved -> Validated -> PolicyBuilt -> Decided
//!     \__________\___________\______________\___________\_______> Rejected
//! ```
//!
//! A token from another pool is still decided, with a deny-all policy. Only failures to
//! establish a verified identity (or defects in policy construction) reject.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::KeySetOrigin;
use crate::config::AuthorizerConfig;
use crate::error::{AuthzError, AuthzResult, UNAUTHORIZED};
use crate::method_arn::MethodArn;
use crate::policy::PolicyBuilder;
use crate::resolver::{KeyResolver, KeySource};
use crate::token::decode_unverified;
use crate::types::{AuthorizerEvent, AuthorizerResponse, IdentityContext};
use crate::validate::TokenValidator;

/// Progress of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    KeysResolved,
    Validated,
    PolicyBuilt,
    Decided,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Parsed => "parsed",
            Stage::KeysResolved => "keys_resolved",
            Stage::Validated => "validated",
            Stage::PolicyBuilt => "policy_built",
            Stage::Decided => "decided",
        };
        f.write_str(s)
    }
}

/// A request that ended without a policy.
///
/// `Display` yields only [`UNAUTHORIZED`]; the cause is kept in `error` for logs.
#[derive(Debug)]
pub struct Rejection {
    /// Last stage the request reached.
    ///
    /// Issuer and `token_use` checks need no keys and run before the fetch, so their
    /// failures are recorded at [`Stage::Parsed`]; key id and signature failures at
    /// [`Stage::KeysResolved`].
    pub stage: Stage,
    pub error: AuthzError,
}

impl Rejection {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    pub fn is_retryable(&self) -> bool {
        self.error.is_retryable()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(UNAUTHORIZED)
    }
}

impl std::error::Error for Rejection {}

/// Result of one authorization request.
pub type Outcome = Result<AuthorizerResponse, Rejection>;

/// The authorizer entry point.
pub struct Authorizer {
    config: AuthorizerConfig,
    keys: Arc<dyn KeySource>,
    validator: TokenValidator,
}

impl Authorizer {
    /// Authorizer using `keys` for key resolution.
    pub fn new(config: AuthorizerConfig, keys: Arc<dyn KeySource>) -> AuthzResult<Self> {
        config.validate()?;
        let validator = TokenValidator::new(&config);
        Ok(Self {
            config,
            keys,
            validator,
        })
    }

    /// Authorizer fetching keys over HTTP, cached per `config.jwks_cache_ttl_secs`.
    pub fn from_config(config: AuthorizerConfig) -> AuthzResult<Self> {
        let resolver = KeyResolver::new(&config)?;
        Self::new(config, Arc::new(resolver))
    }

    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Decide one request.
    pub async fn authorize(&self, event: &AuthorizerEvent) -> Outcome {
        let method = MethodArn::parse(&event.method_arn).map_err(|e| reject(Stage::Received, e))?;
        let token = decode_unverified(&event.authorization_token)
            .map_err(|e| reject(Stage::Received, e))?;
        let issuer = self
            .validator
            .check_claims(&token)
            .map_err(|e| reject(Stage::Parsed, e))?;
        debug!(stage = %Stage::Parsed, issuer = %issuer, kid = ?token.kid(), "token parsed");

        let resolved = self
            .keys
            .key_set(&issuer)
            .await
            .map_err(|e| reject(Stage::Parsed, e))?;
        let mut keys = resolved.keys;
        if let Some(kid) = token.kid() {
            if !keys.contains(kid) && resolved.origin == KeySetOrigin::Cache {
                debug!(kid = %kid, issuer = %issuer, "kid not in cached key set, refreshing");
                keys = self
                    .keys
                    .refresh(&issuer, &keys)
                    .await
                    .map_err(|e| reject(Stage::Parsed, e))?;
            }
        }
        debug!(stage = %Stage::KeysResolved, keys = keys.len(), "key set resolved");

        let identity = self
            .validator
            .validate(&token, &keys)
            .map_err(|e| reject(Stage::KeysResolved, e))?;
        debug!(stage = %Stage::Validated, sub = %identity.subject, "token validated");

        let mut builder = PolicyBuilder::new(identity.subject.as_str(), method.scope());
        if identity.pool_id == self.config.user_pool_id {
            info!(sub = %identity.subject, pool = %identity.pool_id, "allowing all methods");
            builder.allow_all();
        } else {
            warn!(
                sub = %identity.subject,
                pool = %identity.pool_id,
                trusted = %self.config.user_pool_id,
                "token from untrusted pool, denying all methods"
            );
            builder.deny_all();
        }
        let policy = builder.build().map_err(|e| reject(Stage::Validated, e))?;
        debug!(stage = %Stage::PolicyBuilt, statements = policy.policy_document.statement.len(), "policy built");

        let response = AuthorizerResponse::new(policy, IdentityContext::from(&identity));
        debug!(stage = %Stage::Decided, principal = %response.principal_id, "request decided");
        Ok(response)
    }
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn reject(stage: Stage, error: AuthzError) -> Rejection {
    if error.is_defect() {
        error!(stage = %stage, kind = error.kind(), error = %error, "policy construction failed");
    } else {
        warn!(stage = %stage, kind = error.kind(), error = %error, "request rejected");
    }
    Rejection { stage, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::KeySet;
    use crate::policy::Effect;
    use crate::resolver::{ResolvedKeys, StaticKeySource};
    use crate::token::{Issuer, TokenClaims};
    use crate::validate::tests::{id_claims, primary_keys, sign};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const METHOD_ARN: &str = "arn:aws:execute-api:us-east-1:123456789012:abcdef1234/prod/GET/items";

    fn authorizer(pool: &str, keys: KeySet) -> Authorizer {
        Authorizer::new(
            AuthorizerConfig::new(pool),
            Arc::new(StaticKeySource::new(keys)),
        )
        .unwrap()
    }

    fn event(token: &str) -> AuthorizerEvent {
        AuthorizerEvent::new(format!("Bearer {}", token), METHOD_ARN)
    }

    /// Serves `stale` as a cached set and `fresh` on refresh.
    struct RotatingSource {
        stale: Arc<KeySet>,
        fresh: Arc<KeySet>,
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl KeySource for RotatingSource {
        async fn key_set(&self, _issuer: &Issuer) -> AuthzResult<ResolvedKeys> {
            Ok(ResolvedKeys {
                keys: self.stale.clone(),
                origin: KeySetOrigin::Cache,
            })
        }

        async fn refresh(&self, _issuer: &Issuer, _stale: &Arc<KeySet>) -> AuthzResult<Arc<KeySet>> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(self.fresh.clone())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl KeySource for Unreachable {
        async fn key_set(&self, issuer: &Issuer) -> AuthzResult<ResolvedKeys> {
            Err(AuthzError::KeySetUnavailable {
                url: issuer.jwks_url(),
                message: "connection refused".to_string(),
            })
        }

        async fn refresh(&self, _issuer: &Issuer, _stale: &Arc<KeySet>) -> AuthzResult<Arc<KeySet>> {
            unreachable!("refresh without a cached set")
        }
    }

    #[tokio::test]
    async fn test_trusted_pool_allows_all() {
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        let response = authz.authorize(&event(&sign("abc", &id_claims()))).await.unwrap();

        assert_eq!(response.principal_id, "u-1");
        let statements = &response.policy_document.statement;
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].effect, Effect::Allow);
        assert_eq!(
            statements[0].resource,
            vec!["arn:aws:execute-api:us-east-1:123456789012:abcdef1234/prod/*/*"]
        );
        assert_eq!(response.context.sub, "u-1");
        assert_eq!(response.context.username.as_deref(), Some("alice"));
        assert_eq!(response.context.user_pool_id, "pool_XYZ");
        assert_eq!(response.context.role, "");
    }

    #[tokio::test]
    async fn test_minimal_id_token_is_allowed() {
        let claims: TokenClaims = serde_json::from_value(serde_json::json!({
            "iss": "https://issuer.example/pool_XYZ",
            "sub": "u-1",
            "token_use": "id",
        }))
        .unwrap();
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        let response = authz.authorize(&event(&sign("abc", &claims))).await.unwrap();

        assert_eq!(response.principal_id, "u-1");
        assert_eq!(response.policy_document.statement[0].effect, Effect::Allow);
    }

    #[tokio::test]
    async fn test_other_pool_is_decided_with_deny() {
        let authz = authorizer("pool_OTHER", primary_keys("abc"));
        let response = authz.authorize(&event(&sign("abc", &id_claims()))).await.unwrap();

        let statements = &response.policy_document.statement;
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].effect, Effect::Deny);
        assert_eq!(response.context.user_pool_id, "pool_XYZ");
    }

    #[tokio::test]
    async fn test_access_token_rejected() {
        let mut claims = id_claims();
        claims.token_use = Some("access".to_string());
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        let rejection = authz.authorize(&event(&sign("abc", &claims))).await.unwrap_err();

        assert!(matches!(rejection.error, AuthzError::WrongTokenPurpose { .. }));
        assert_eq!(rejection.stage, Stage::Parsed);
        assert_eq!(rejection.to_string(), UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_kid_rejected() {
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        let rejection = authz.authorize(&event(&sign("other", &id_claims()))).await.unwrap_err();
        assert_eq!(rejection.kind(), "unknown_signing_key");
        assert_eq!(rejection.stage, Stage::KeysResolved);
    }

    #[tokio::test]
    async fn test_garbage_credential_rejected() {
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        for credential in ["", "Bearer", "Bearer not-a-token", "Bearer a.b"] {
            let rejection = authz
                .authorize(&AuthorizerEvent::new(credential, METHOD_ARN))
                .await
                .unwrap_err();
            assert!(matches!(rejection.error, AuthzError::MalformedToken { .. }), "{credential:?}");
            assert_eq!(rejection.stage, Stage::Received);
        }
    }

    #[tokio::test]
    async fn test_bad_method_arn_rejected() {
        let authz = authorizer("pool_XYZ", primary_keys("abc"));
        let token = format!("Bearer {}", sign("abc", &id_claims()));
        let rejection = authz
            .authorize(&AuthorizerEvent::new(token, "not-an-arn"))
            .await
            .unwrap_err();
        assert!(matches!(rejection.error, AuthzError::InvalidMethodArn { .. }));
    }

    #[tokio::test]
    async fn test_key_set_unavailable_rejected() {
        let authz = Authorizer::new(AuthorizerConfig::new("pool_XYZ"), Arc::new(Unreachable)).unwrap();
        let rejection = authz.authorize(&event(&sign("abc", &id_claims()))).await.unwrap_err();
        assert!(rejection.is_retryable());
        assert_eq!(rejection.stage, Stage::Parsed);
    }

    #[tokio::test]
    async fn test_cached_set_missing_kid_refreshes_once() {
        let source = Arc::new(RotatingSource {
            stale: Arc::new(primary_keys("old")),
            fresh: Arc::new(primary_keys("new")),
            refreshes: AtomicUsize::new(0),
        });
        let authz = Authorizer::new(AuthorizerConfig::new("pool_XYZ"), source.clone()).unwrap();

        let response = authz.authorize(&event(&sign("new", &id_claims()))).await.unwrap();
        assert_eq!(response.principal_id, "u-1");
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        // Present in the cached set: no refresh.
        authz.authorize(&event(&sign("old", &id_claims()))).await.unwrap();
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 1);

        // Missing from both: one refresh, then rejection.
        let rejection = authz.authorize(&event(&sign("gone", &id_claims()))).await.unwrap_err();
        assert!(matches!(rejection.error, AuthzError::UnknownSigningKey { .. }));
        assert_eq!(source.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expected_issuer_blocks_before_fetch() {
        let config = AuthorizerConfig::new("pool_XYZ")
            .with_expected_issuer("https://cognito-idp.us-east-1.amazonaws.com/pool_XYZ");
        let authz = Authorizer::new(config, Arc::new(Unreachable)).unwrap();
        let rejection = authz.authorize(&event(&sign("abc", &id_claims()))).await.unwrap_err();
        assert!(matches!(rejection.error, AuthzError::InvalidIssuer { .. }));
    }

    #[test]
    fn test_empty_pool_is_config_error() {
        let err = Authorizer::new(
            AuthorizerConfig::new(""),
            Arc::new(StaticKeySource::new(KeySet::default())),
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::Config { .. }));
    }
}
