//! Bearer credential parsing.
//!
//! Splits the token out of a transport header and decodes header and claims without
//! checking the signature. Nothing decoded here is trusted until [`crate::validate`]
//! has verified it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::Header;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthzError, AuthzResult};

/// Path appended to an issuer URL to locate its key set.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// Claims read from an identity token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Issuer URL; its last path segment is the pool id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Stable subject identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// `id` for identity tokens, `access` for access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,

    /// Reassignable user name.
    #[serde(
        rename = "cognito:username",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Expiry (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Not-before (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issued-at (seconds since epoch).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Remaining claims (`aud`, `auth_time`, custom attributes, ...).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A token decoded without signature verification.
#[derive(Debug, Clone)]
pub struct DecodedToken {
    pub header: Header,
    pub claims: TokenClaims,
    compact: String,
}

impl DecodedToken {
    /// The compact token the signature is computed over.
    pub fn compact(&self) -> &str {
        &self.compact
    }

    /// Key id from the header.
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// The issuer named by the (still unverified) claims.
    pub fn issuer(&self) -> AuthzResult<Issuer> {
        let iss = self.claims.iss.as_deref().ok_or_else(|| AuthzError::InvalidIssuer {
            reason: "token has no iss claim".to_string(),
        })?;
        Issuer::parse(iss)
    }
}

/// A URL-shaped token issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issuer {
    raw: String,
}

impl Issuer {
    /// Accept `raw` if it is an absolute http(s) URL with a host.
    pub fn parse(raw: &str) -> AuthzResult<Self> {
        let url = Url::parse(raw).map_err(|e| AuthzError::InvalidIssuer {
            reason: format!("{:?} is not a URL: {}", raw, e),
        })?;
        if !matches!(url.scheme(), "https" | "http") {
            return Err(AuthzError::InvalidIssuer {
                reason: format!("{:?} must use http(s)", raw),
            });
        }
        if url.host_str().is_none() {
            return Err(AuthzError::InvalidIssuer {
                reason: format!("{:?} has no host", raw),
            });
        }
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Everything after the last `/`.
    pub fn pool_id(&self) -> &str {
        match self.raw.rfind('/') {
            Some(idx) => &self.raw[idx + 1..],
            None => &self.raw,
        }
    }

    /// Location of the issuer's published key set.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.raw.trim_end_matches('/'), JWKS_PATH)
    }
}

impl std::fmt::Display for Issuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Drop the scheme prefix: everything up to and including the first space.
///
/// A credential without a space is returned unchanged.
pub fn strip_scheme(credential: &str) -> &str {
    match credential.find(' ') {
        Some(idx) => &credential[idx + 1..],
        None => credential,
    }
}

/// Decode a `<scheme> <token>` credential into header and claims.
pub fn decode_unverified(credential: &str) -> AuthzResult<DecodedToken> {
    let token = strip_scheme(credential.trim());

    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(AuthzError::MalformedToken {
            reason: format!("expected 3 segments, found {}", segments.len()),
        });
    }
    if segments.iter().any(|s| s.is_empty()) {
        return Err(AuthzError::MalformedToken {
            reason: "empty segment".to_string(),
        });
    }

    let header = jsonwebtoken::decode_header(token).map_err(|e| AuthzError::MalformedToken {
        reason: format!("invalid header: {}", e),
    })?;

    let payload = URL_SAFE_NO_PAD
        .decode(segments[1].trim_end_matches('='))
        .map_err(|e| AuthzError::MalformedToken {
            reason: format!("payload is not base64url: {}", e),
        })?;
    let claims: TokenClaims =
        serde_json::from_slice(&payload).map_err(|e| AuthzError::MalformedToken {
            reason: format!("payload is not a claims object: {}", e),
        })?;

    Ok(DecodedToken {
        header,
        claims,
        compact: token.to_string(),
    })
}
