//! JSON Web Key Set types and conversion into verification keys.

use std::collections::HashMap;
use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::{Deserialize, Serialize};

const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// Key set document published at `{issuer}/.well-known/jwks.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC).
    pub kty: String,

    /// Key ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Key use (sig, enc).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// EC curve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

/// Why a key set entry cannot be used for verification.
#[derive(Debug, thiserror::Error)]
pub enum UnusableKey {
    #[error("entry has no kid")]
    MissingKid,
    #[error("key use {0:?} is not sig")]
    NotForSigning(String),
    #[error("unsupported key type {0:?}")]
    UnsupportedType(String),
    #[error("unsupported curve {0:?}")]
    UnsupportedCurve(String),
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),
    #[error("algorithm {alg} does not belong to key type {kty}")]
    AlgorithmMismatch { alg: String, kty: String },
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),
    #[error("invalid key material: {0}")]
    Material(#[from] jsonwebtoken::errors::Error),
}

/// A verification-ready public key and the algorithms it may verify.
pub struct VerificationKey {
    kid: String,
    algorithms: Vec<Algorithm>,
    decoding_key: DecodingKey,
}

impl VerificationKey {
    /// Convert a key set entry.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, UnusableKey> {
        let kid = jwk.kid.clone().ok_or(UnusableKey::MissingKid)?;

        if let Some(use_) = &jwk.use_ {
            if use_ != "sig" {
                return Err(UnusableKey::NotForSigning(use_.clone()));
            }
        }

        let (family, decoding_key) = match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_deref().ok_or(UnusableKey::MissingParameter("n"))?;
                let e = jwk.e.as_deref().ok_or(UnusableKey::MissingParameter("e"))?;
                (
                    RSA_ALGORITHMS.to_vec(),
                    DecodingKey::from_rsa_components(n, e)?,
                )
            }
            "EC" => {
                let crv = jwk.crv.as_deref().ok_or(UnusableKey::MissingParameter("crv"))?;
                let alg = match crv {
                    "P-256" => Algorithm::ES256,
                    "P-384" => Algorithm::ES384,
                    other => return Err(UnusableKey::UnsupportedCurve(other.to_string())),
                };
                let x = jwk.x.as_deref().ok_or(UnusableKey::MissingParameter("x"))?;
                let y = jwk.y.as_deref().ok_or(UnusableKey::MissingParameter("y"))?;
                (vec![alg], DecodingKey::from_ec_components(x, y)?)
            }
            other => return Err(UnusableKey::UnsupportedType(other.to_string())),
        };

        let algorithms = match &jwk.alg {
            Some(name) => {
                let alg = Algorithm::from_str(name)
                    .map_err(|_| UnusableKey::UnsupportedAlgorithm(name.clone()))?;
                if !family.contains(&alg) {
                    return Err(UnusableKey::AlgorithmMismatch {
                        alg: name.clone(),
                        kty: jwk.kty.clone(),
                    });
                }
                vec![alg]
            }
            None => family,
        };

        Ok(Self {
            kid,
            algorithms,
            decoding_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithms this key may verify.
    pub fn algorithms(&self) -> &[Algorithm] {
        &self.algorithms
    }

    pub fn allows(&self, alg: Algorithm) -> bool {
        self.algorithms.contains(&alg)
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("kid", &self.kid)
            .field("algorithms", &self.algorithms)
            .finish_non_exhaustive()
    }
}

/// Verification keys indexed by key id. Immutable once built.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, VerificationKey>,
}

impl KeySet {
    /// Convert every usable entry; unusable entries are logged and skipped.
    pub fn from_jwks(jwks: &JwkSet) -> Self {
        let mut keys = HashMap::with_capacity(jwks.keys.len());
        for jwk in &jwks.keys {
            match VerificationKey::from_jwk(jwk) {
                Ok(key) => {
                    if keys.contains_key(key.kid()) {
                        tracing::warn!(kid = %key.kid(), "duplicate kid in key set, keeping first");
                        continue;
                    }
                    keys.insert(key.kid.clone(), key);
                }
                Err(e) => {
                    tracing::warn!(kid = ?jwk.kid, kty = %jwk.kty, error = %e, "skipping key set entry");
                }
            }
        }
        Self { keys }
    }

    /// Parse a key set document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let jwks: JwkSet = serde_json::from_str(json)?;
        Ok(Self::from_jwks(&jwks))
    }

    pub fn get(&self, kid: &str) -> Option<&VerificationKey> {
        self.keys.get(kid)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key ids, sorted.
    pub fn kids(&self) -> Vec<&str> {
        let mut kids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        kids.sort_unstable();
        kids
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Modulus of `tests/fixtures/primary.pem`.
    pub(crate) const PRIMARY_N: &str = "zxgyeqXNBRmeu0WLE81sNK4eOXDQFztvuXax7GvyDCA302jYy68Gd6oqDzjYJFheO2hf0GyoMg6YxGJTRdF50-B_u4vSt8iCjfKCU29fAJ_Z6BB6RLIh0ryv-eV3X7K9iwEdK9HUwqs27Cb--1BWwfUwPFsjhuz3Z1pDToBQrJT9muClrEDbX42hs3RefceoPVBRWC3y7b8XgbZeV3PLszJspLfA8CpW4xzRFg11eJBVnKQcsCgCcUNBRPyU5n3cgHZzunY_UMLtnYKtjlbAvFdSsF51bGyS1DUOMeuoqFwmhE-ZsZV4tivJ3H-IpWyPD8cUgX0TMXoOHC5qD24F6w";

    pub(crate) fn rsa_jwk(kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            alg: Some("RS256".to_string()),
            use_: Some("sig".to_string()),
            n: Some(PRIMARY_N.to_string()),
            e: Some("AQAB".to_string()),
            ..Jwk::default()
        }
    }

    #[test]
    fn test_rsa_key_indexed_by_kid() {
        let set = KeySet::from_jwks(&JwkSet {
            keys: vec![rsa_jwk("abc"), rsa_jwk("def")],
        });
        assert_eq!(set.len(), 2);
        assert_eq!(set.kids(), vec!["abc", "def"]);
        let key = set.get("abc").unwrap();
        assert_eq!(key.algorithms(), &[Algorithm::RS256]);
        assert!(!key.allows(Algorithm::ES256));
    }

    #[test]
    fn test_rsa_without_alg_allows_family() {
        let mut jwk = rsa_jwk("abc");
        jwk.alg = None;
        let key = VerificationKey::from_jwk(&jwk).unwrap();
        assert!(key.allows(Algorithm::RS512));
        assert!(key.allows(Algorithm::PS256));
        assert!(!key.allows(Algorithm::HS256));
    }

    #[test]
    fn test_unusable_entries_skipped() {
        let mut no_kid = rsa_jwk("x");
        no_kid.kid = None;
        let mut encryption = rsa_jwk("enc");
        encryption.use_ = Some("enc".to_string());
        let mut symmetric = rsa_jwk("oct");
        symmetric.kty = "oct".to_string();
        let mut mismatched = rsa_jwk("mismatch");
        mismatched.alg = Some("ES256".to_string());
        let mut no_modulus = rsa_jwk("no-n");
        no_modulus.n = None;

        let set = KeySet::from_jwks(&JwkSet {
            keys: vec![
                no_kid,
                encryption,
                symmetric,
                mismatched,
                no_modulus,
                rsa_jwk("good"),
            ],
        });
        assert_eq!(set.kids(), vec!["good"]);
    }

    #[test]
    fn test_unusable_key_reasons() {
        let mut jwk = rsa_jwk("k");
        jwk.e = None;
        assert!(matches!(
            VerificationKey::from_jwk(&jwk),
            Err(UnusableKey::MissingParameter("e"))
        ));

        let ec = Jwk {
            kty: "EC".to_string(),
            kid: Some("ec".to_string()),
            crv: Some("P-521".to_string()),
            ..Jwk::default()
        };
        assert!(matches!(
            VerificationKey::from_jwk(&ec),
            Err(UnusableKey::UnsupportedCurve(_))
        ));
    }

    #[test]
    fn test_from_json_document() {
        let json = serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": "abc",
                "alg": "RS256",
                "use": "sig",
                "n": PRIMARY_N,
                "e": "AQAB"
            }]
        })
        .to_string();
        let set = KeySet::from_json(&json).unwrap();
        assert!(set.contains("abc"));
        assert!(KeySet::from_json("{\"nokeys\": true}").is_err());
    }

    #[test]
    fn test_empty_set() {
        let set = KeySet::from_jwks(&JwkSet { keys: vec![] });
        assert!(set.is_empty());
        assert!(set.get("abc").is_none());
    }
}
