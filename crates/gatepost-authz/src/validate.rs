//! Claim checks and signature verification.

use jsonwebtoken::Validation;
use tracing::debug;

use crate::config::AuthorizerConfig;
use crate::error::{AuthzError, AuthzResult};
use crate::jwks::{KeySet, VerificationKey};
use crate::token::{DecodedToken, Issuer, TokenClaims};

/// The only accepted `token_use`: identity tokens.
pub const ID_TOKEN_USE: &str = "id";

/// Identity extracted from a verified token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// Stable subject; the policy principal.
    pub subject: String,
    /// Reassignable user name, for context only.
    pub username: Option<String>,
    pub email: Option<String>,
    /// Last path segment of the issuer.
    pub pool_id: String,
    pub issuer: Issuer,
    pub claims: TokenClaims,
}

/// Verifies decoded tokens against a key set.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    expected_issuer: Option<String>,
    audience: Option<String>,
    leeway: u64,
}

impl TokenValidator {
    pub fn new(config: &AuthorizerConfig) -> Self {
        Self {
            expected_issuer: config.expected_issuer.clone(),
            audience: config.audience.clone(),
            leeway: config.leeway_secs,
        }
    }

    /// Checks that need no key: issuer shape, configured issuer, token purpose.
    pub fn check_claims(&self, token: &DecodedToken) -> AuthzResult<Issuer> {
        let issuer = token.issuer()?;

        if let Some(expected) = &self.expected_issuer {
            if issuer.as_str() != expected {
                return Err(AuthzError::InvalidIssuer {
                    reason: format!("{} is not the configured issuer", issuer),
                });
            }
        }

        match token.claims.token_use.as_deref() {
            Some(ID_TOKEN_USE) => {}
            other => {
                return Err(AuthzError::WrongTokenPurpose {
                    expected: ID_TOKEN_USE.to_string(),
                    actual: other.unwrap_or("<missing>").to_string(),
                })
            }
        }

        Ok(issuer)
    }

    /// Full validation: claim checks, key lookup, signature and time checks.
    pub fn validate(&self, token: &DecodedToken, keys: &KeySet) -> AuthzResult<VerifiedIdentity> {
        let issuer = self.check_claims(token)?;

        let kid = token.kid().ok_or_else(|| AuthzError::UnknownSigningKey {
            kid: "<none>".to_string(),
        })?;
        let key = keys.get(kid).ok_or_else(|| AuthzError::UnknownSigningKey {
            kid: kid.to_string(),
        })?;

        let claims = self.verify_signature(token, key, &issuer)?;
        debug!(kid = %kid, issuer = %issuer, "token signature verified");

        let subject = claims.sub.clone().ok_or_else(|| AuthzError::MalformedToken {
            reason: "token has no sub claim".to_string(),
        })?;

        Ok(VerifiedIdentity {
            subject,
            username: claims.username.clone(),
            email: claims.email.clone(),
            pool_id: issuer.pool_id().to_string(),
            issuer,
            claims,
        })
    }

    fn verify_signature(
        &self,
        token: &DecodedToken,
        key: &VerificationKey,
        issuer: &Issuer,
    ) -> AuthzResult<TokenClaims> {
        let alg = token.header.alg;
        if !key.allows(alg) {
            return Err(AuthzError::SignatureInvalid {
                reason: format!("algorithm {:?} not accepted by key {}", alg, key.kid()),
            });
        }

        let mut validation = Validation::new(alg);
        validation.algorithms = key.algorithms().to_vec();
        validation.leeway = self.leeway;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        // `exp` and `nbf` are enforced when present, not required.
        validation.set_required_spec_claims(&["iss"]);
        validation.set_issuer(&[self.expected_issuer.as_deref().unwrap_or(issuer.as_str())]);
        match &self.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        jsonwebtoken::decode::<TokenClaims>(token.compact(), key.decoding_key(), &validation)
            .map(|data| data.claims)
            .map_err(|e| AuthzError::SignatureInvalid {
                reason: e.to_string(),
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::jwks::tests::rsa_jwk;
    use crate::jwks::JwkSet;
    use crate::token::decode_unverified;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};

    pub(crate) const PRIMARY_PEM: &str = include_str!("../tests/fixtures/primary.pem");
    pub(crate) const ROTATED_PEM: &str = include_str!("../tests/fixtures/rotated.pem");
    pub(crate) const ISSUER: &str = "https://issuer.example/pool_XYZ";

    pub(crate) fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub(crate) fn id_claims() -> TokenClaims {
        TokenClaims {
            iss: Some(ISSUER.to_string()),
            sub: Some("u-1".to_string()),
            token_use: Some("id".to_string()),
            username: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
            exp: Some(now() + 3600),
            iat: Some(now()),
            ..TokenClaims::default()
        }
    }

    pub(crate) fn sign_with(pem: &str, kid: &str, claims: &TokenClaims) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, claims, &key).unwrap()
    }

    pub(crate) fn sign(kid: &str, claims: &TokenClaims) -> String {
        sign_with(PRIMARY_PEM, kid, claims)
    }

    pub(crate) fn primary_keys(kid: &str) -> KeySet {
        KeySet::from_jwks(&JwkSet {
            keys: vec![rsa_jwk(kid)],
        })
    }

    fn validator() -> TokenValidator {
        TokenValidator::new(&AuthorizerConfig::new("pool_XYZ"))
    }

    fn validate(validator: &TokenValidator, token: &str) -> AuthzResult<VerifiedIdentity> {
        let decoded = decode_unverified(&format!("Bearer {}", token))?;
        validator.validate(&decoded, &primary_keys("abc"))
    }

    #[test]
    fn test_valid_token() {
        let identity = validate(&validator(), &sign("abc", &id_claims())).unwrap();
        assert_eq!(identity.subject, "u-1");
        assert_eq!(identity.username.as_deref(), Some("alice"));
        assert_eq!(identity.email.as_deref(), Some("alice@example.com"));
        assert_eq!(identity.pool_id, "pool_XYZ");
        assert_eq!(identity.issuer.as_str(), ISSUER);
    }

    #[test]
    fn test_missing_issuer() {
        let mut claims = id_claims();
        claims.iss = None;
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidIssuer { .. }));
    }

    #[test]
    fn test_access_token_rejected() {
        let mut claims = id_claims();
        claims.token_use = Some("access".to_string());
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        match err {
            AuthzError::WrongTokenPurpose { actual, .. } => assert_eq!(actual, "access"),
            other => panic!("expected WrongTokenPurpose, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_token_use_rejected() {
        let mut claims = id_claims();
        claims.token_use = None;
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        assert!(matches!(err, AuthzError::WrongTokenPurpose { .. }));
    }

    #[test]
    fn test_unknown_kid() {
        let err = validate(&validator(), &sign("zzz", &id_claims())).unwrap_err();
        match err {
            AuthzError::UnknownSigningKey { kid } => assert_eq!(kid, "zzz"),
            other => panic!("expected UnknownSigningKey, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_signing_key() {
        let token = sign_with(ROTATED_PEM, "abc", &id_claims());
        let err = validate(&validator(), &token).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_tampered_payload() {
        let token = sign("abc", &id_claims());
        let mut forged = id_claims();
        forged.sub = Some("admin".to_string());
        let forged_payload = sign("abc", &forged);

        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged_payload.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        let err = validate(&validator(), &spliced).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_expired_token() {
        let mut claims = id_claims();
        claims.exp = Some(now() - 600);
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_token_without_expiry_accepted() {
        let mut claims = id_claims();
        claims.exp = None;
        claims.iat = None;
        let identity = validate(&validator(), &sign("abc", &claims)).unwrap();
        assert_eq!(identity.subject, "u-1");
    }

    #[test]
    fn test_not_yet_valid_token() {
        let mut claims = id_claims();
        claims.nbf = Some(now() + 600);
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_leeway_tolerates_skew() {
        let mut claims = id_claims();
        claims.exp = Some(now() - 10);
        let lenient = TokenValidator::new(&AuthorizerConfig::new("pool_XYZ").with_leeway(120));
        assert!(validate(&lenient, &sign("abc", &claims)).is_ok());
    }

    #[test]
    fn test_algorithm_outside_key_family() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("abc".to_string());
        let token = jsonwebtoken::encode(
            &header,
            &id_claims(),
            &EncodingKey::from_secret(b"shared-secret"),
        )
        .unwrap();
        let err = validate(&validator(), &token).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));
    }

    #[test]
    fn test_expected_issuer_enforced() {
        let strict = TokenValidator::new(
            &AuthorizerConfig::new("pool_XYZ")
                .with_expected_issuer("https://cognito-idp.us-east-1.amazonaws.com/pool_XYZ"),
        );
        let err = validate(&strict, &sign("abc", &id_claims())).unwrap_err();
        assert!(matches!(err, AuthzError::InvalidIssuer { .. }));

        let matching =
            TokenValidator::new(&AuthorizerConfig::new("pool_XYZ").with_expected_issuer(ISSUER));
        assert!(validate(&matching, &sign("abc", &id_claims())).is_ok());
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let mut claims = id_claims();
        claims
            .extra
            .insert("aud".to_string(), serde_json::json!("client-1"));
        let token = sign("abc", &claims);

        // Unconfigured: aud is ignored.
        assert!(validate(&validator(), &token).is_ok());

        let other =
            TokenValidator::new(&AuthorizerConfig::new("pool_XYZ").with_audience("client-2"));
        let err = validate(&other, &token).unwrap_err();
        assert!(matches!(err, AuthzError::SignatureInvalid { .. }));

        let same = TokenValidator::new(&AuthorizerConfig::new("pool_XYZ").with_audience("client-1"));
        assert!(validate(&same, &token).is_ok());
    }

    #[test]
    fn test_missing_subject() {
        let mut claims = id_claims();
        claims.sub = None;
        let err = validate(&validator(), &sign("abc", &claims)).unwrap_err();
        assert!(matches!(err, AuthzError::MalformedToken { .. }));
    }
}
