//! Key resolution: issuer -> verification keys.
//!
//! Resolution order:
//! 1. Cache (when a TTL is configured and the entry is unexpired)
//! 2. `{issuer}/.well-known/jwks.json`
//!
//! [`StaticKeySource`] serves a pinned key set instead and never touches the network.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{KeySetCache, KeySetOrigin};
use crate::client::JwksClient;
use crate::config::AuthorizerConfig;
use crate::error::AuthzResult;
use crate::jwks::KeySet;
use crate::token::Issuer;

/// Keys resolved for one request.
#[derive(Debug, Clone)]
pub struct ResolvedKeys {
    pub keys: Arc<KeySet>,
    pub origin: KeySetOrigin,
}

/// Supplies verification keys for an issuer.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Keys published by `issuer`.
    async fn key_set(&self, issuer: &Issuer) -> AuthzResult<ResolvedKeys>;

    /// Replace a cached set that lacked a requested key id.
    ///
    /// Only called for sets whose origin is [`KeySetOrigin::Cache`].
    async fn refresh(&self, issuer: &Issuer, stale: &Arc<KeySet>) -> AuthzResult<Arc<KeySet>>;
}

/// Fetches issuer key sets over HTTP, optionally caching them.
#[derive(Debug)]
pub struct KeyResolver {
    client: JwksClient,
    cache: Option<KeySetCache>,
}

impl KeyResolver {
    /// Resolver with the timeout and cache TTL from `config`.
    pub fn new(config: &AuthorizerConfig) -> AuthzResult<Self> {
        let client = JwksClient::new(Duration::from_secs(config.jwks_timeout_secs))?;
        let cache = (config.jwks_cache_ttl_secs > 0).then(|| {
            KeySetCache::new(Duration::from_secs(config.jwks_cache_ttl_secs))
                .with_min_refresh(Duration::from_secs(config.jwks_min_refresh_secs))
        });
        Ok(Self { client, cache })
    }

    /// Resolver around an existing client; `cache_ttl` of zero disables caching.
    pub fn with_client(client: JwksClient, cache_ttl: Duration) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| KeySetCache::new(cache_ttl));
        Self { client, cache }
    }

    /// Set the minimum interval between forced refreshes of a cached set.
    pub fn with_min_refresh(mut self, interval: Duration) -> Self {
        self.cache = self.cache.map(|cache| cache.with_min_refresh(interval));
        self
    }

    pub fn cache(&self) -> Option<&KeySetCache> {
        self.cache.as_ref()
    }
}

#[async_trait]
impl KeySource for KeyResolver {
    async fn key_set(&self, issuer: &Issuer) -> AuthzResult<ResolvedKeys> {
        match &self.cache {
            Some(cache) => {
                let (keys, origin) = cache
                    .get_or_fetch(issuer.as_str(), || self.client.fetch_key_set(issuer))
                    .await?;
                debug!(issuer = %issuer, origin = ?origin, "key set resolved");
                Ok(ResolvedKeys { keys, origin })
            }
            None => {
                let keys = self.client.fetch_key_set(issuer).await?;
                Ok(ResolvedKeys {
                    keys: Arc::new(keys),
                    origin: KeySetOrigin::Network,
                })
            }
        }
    }

    async fn refresh(&self, issuer: &Issuer, stale: &Arc<KeySet>) -> AuthzResult<Arc<KeySet>> {
        debug!(issuer = %issuer, "refreshing key set");
        match &self.cache {
            Some(cache) => {
                cache
                    .refresh(issuer.as_str(), stale, || self.client.fetch_key_set(issuer))
                    .await
            }
            None => Ok(Arc::new(self.client.fetch_key_set(issuer).await?)),
        }
    }
}

/// A pinned key set used for every issuer.
#[derive(Debug, Clone)]
pub struct StaticKeySource {
    keys: Arc<KeySet>,
}

impl StaticKeySource {
    pub fn new(keys: KeySet) -> Self {
        Self {
            keys: Arc::new(keys),
        }
    }
}

#[async_trait]
impl KeySource for StaticKeySource {
    async fn key_set(&self, _issuer: &Issuer) -> AuthzResult<ResolvedKeys> {
        Ok(ResolvedKeys {
            keys: self.keys.clone(),
            origin: KeySetOrigin::Network,
        })
    }

    async fn refresh(&self, _issuer: &Issuer, _stale: &Arc<KeySet>) -> AuthzResult<Arc<KeySet>> {
        Ok(self.keys.clone())
    }
}
