//! Authorizer configuration.
//!
//! Configuration is an explicit value handed to [`crate::Authorizer::new`]; nothing in the
//! library reads process-wide state after construction.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, AuthzResult};

/// Authorizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizerConfig {
    /// The single trusted pool. A verified token whose issuer ends in a different pool id
    /// gets a deny-all policy.
    pub user_pool_id: String,

    /// Exact issuer URL to require. When unset the issuer is taken from the token itself
    /// and only the pool id is compared.
    #[serde(default)]
    pub expected_issuer: Option<String>,

    /// Audience the token must carry. When unset `aud` is not checked.
    #[serde(default)]
    pub audience: Option<String>,

    /// Key-set fetch timeout in seconds.
    #[serde(default = "default_jwks_timeout")]
    pub jwks_timeout_secs: u64,

    /// Key-set cache TTL in seconds (0 disables caching).
    #[serde(default)]
    pub jwks_cache_ttl_secs: u64,

    /// Minimum seconds between forced refreshes of a cached key set when a token names an
    /// unknown key id. Only applies with caching enabled.
    #[serde(default = "default_jwks_min_refresh")]
    pub jwks_min_refresh_secs: u64,

    /// Clock-skew tolerance in seconds for `exp` and `nbf`.
    #[serde(default)]
    pub leeway_secs: u64,
}

fn default_jwks_timeout() -> u64 {
    5
}

fn default_jwks_min_refresh() -> u64 {
    30
}

impl AuthorizerConfig {
    /// Config trusting `user_pool_id` with every other field at its default.
    pub fn new(user_pool_id: impl Into<String>) -> Self {
        Self {
            user_pool_id: user_pool_id.into(),
            expected_issuer: None,
            audience: None,
            jwks_timeout_secs: default_jwks_timeout(),
            jwks_cache_ttl_secs: 0,
            jwks_min_refresh_secs: default_jwks_min_refresh(),
            leeway_secs: 0,
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `GATEPOST_USER_POOL_ID` | Trusted pool id (falls back to `userpool_id`) |
    /// | `GATEPOST_EXPECTED_ISSUER` | Exact issuer URL to require |
    /// | `GATEPOST_AUDIENCE` | Required audience |
    /// | `GATEPOST_JWKS_TIMEOUT` | Key-set fetch timeout in seconds (default: 5) |
    /// | `GATEPOST_JWKS_CACHE_TTL` | Key-set cache TTL in seconds (default: 0, disabled) |
    /// | `GATEPOST_JWKS_MIN_REFRESH` | Minimum seconds between forced key-set refreshes (default: 30) |
    /// | `GATEPOST_LEEWAY` | Clock-skew tolerance in seconds (default: 0) |
    pub fn from_env() -> AuthzResult<Self> {
        let user_pool_id = non_empty_var("GATEPOST_USER_POOL_ID")
            .or_else(|| non_empty_var("userpool_id"))
            .ok_or_else(|| AuthzError::Config {
                message: "GATEPOST_USER_POOL_ID is not set".to_string(),
            })?;

        let config = Self {
            user_pool_id,
            expected_issuer: non_empty_var("GATEPOST_EXPECTED_ISSUER"),
            audience: non_empty_var("GATEPOST_AUDIENCE"),
            jwks_timeout_secs: parsed_var("GATEPOST_JWKS_TIMEOUT")?
                .unwrap_or_else(default_jwks_timeout),
            jwks_cache_ttl_secs: parsed_var("GATEPOST_JWKS_CACHE_TTL")?.unwrap_or(0),
            jwks_min_refresh_secs: parsed_var("GATEPOST_JWKS_MIN_REFRESH")?
                .unwrap_or_else(default_jwks_min_refresh),
            leeway_secs: parsed_var("GATEPOST_LEEWAY")?.unwrap_or(0),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse config from YAML.
    pub fn from_yaml_str(yaml: &str) -> AuthzResult<Self> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| AuthzError::Config {
            message: format!("invalid config YAML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> AuthzResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| AuthzError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Check invariants not expressible in the type.
    pub fn validate(&self) -> AuthzResult<()> {
        if self.user_pool_id.trim().is_empty() {
            return Err(AuthzError::Config {
                message: "user_pool_id must not be empty".to_string(),
            });
        }
        if let Some(issuer) = &self.expected_issuer {
            url::Url::parse(issuer).map_err(|e| AuthzError::Config {
                message: format!("expected_issuer is not a URL: {}", e),
            })?;
        }
        Ok(())
    }

    /// Require an exact issuer URL.
    pub fn with_expected_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    /// Require an audience.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Set the key-set fetch timeout.
    pub fn with_jwks_timeout(mut self, secs: u64) -> Self {
        self.jwks_timeout_secs = secs;
        self
    }

    /// Enable key-set caching.
    pub fn with_jwks_cache_ttl(mut self, secs: u64) -> Self {
        self.jwks_cache_ttl_secs = secs;
        self
    }

    /// Set the minimum interval between forced key-set refreshes.
    pub fn with_jwks_min_refresh(mut self, secs: u64) -> Self {
        self.jwks_min_refresh_secs = secs;
        self
    }

    /// Set the clock-skew tolerance.
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_var(name: &str) -> AuthzResult<Option<u64>> {
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| AuthzError::Config {
            message: format!("{} must be a non-negative integer, got {:?}", name, raw),
        }),
        None => Ok(None),
    }
}
