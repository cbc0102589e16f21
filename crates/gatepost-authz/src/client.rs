//! HTTP client for issuer key sets.
//!
//! This is the only place that interprets HTTP status codes. Failures are not retried;
//! every error surfaces as [`AuthzError::KeySetUnavailable`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{AuthzError, AuthzResult};
use crate::jwks::{JwkSet, KeySet};
use crate::token::Issuer;

/// User-Agent sent with key set requests.
pub const JWKS_USER_AGENT: &str = concat!("gatepost-authz/", env!("CARGO_PKG_VERSION"));

/// Fetches `{issuer}/.well-known/jwks.json`.
#[derive(Debug, Clone)]
pub struct JwksClient {
    client: reqwest::Client,
}

impl JwksClient {
    /// Create a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> AuthzResult<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(JWKS_USER_AGENT));
        default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|e| AuthzError::Config {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    /// Use a preconfigured reqwest client (proxies, custom TLS roots).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch the raw key set document for `issuer`.
    pub async fn fetch_jwks(&self, issuer: &Issuer) -> AuthzResult<JwkSet> {
        let url = issuer.jwks_url();
        debug!(url = %url, "fetching key set");

        let unavailable = |message: String| AuthzError::KeySetUnavailable {
            url: url.clone(),
            message,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(describe_transport_error(&e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(unavailable(format!("HTTP {}", status.as_u16())));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| unavailable(format!("failed to parse key set: {}", e)))
    }

    /// Fetch and convert the key set for `issuer`.
    pub async fn fetch_key_set(&self, issuer: &Issuer) -> AuthzResult<KeySet> {
        let jwks = self.fetch_jwks(issuer).await?;
        let keys = KeySet::from_jwks(&jwks);
        debug!(issuer = %issuer, published = jwks.keys.len(), usable = keys.len(), "key set fetched");
        Ok(keys)
    }
}

fn describe_transport_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
