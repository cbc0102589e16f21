//! Error types for the authorizer.

/// Message returned to callers for every rejection. Validation details stay in the logs.
pub const UNAUTHORIZED: &str = "Unauthorized";

/// Authorizer errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Credential is not a decodable three-part token.
    #[error("malformed token: {reason}")]
    MalformedToken { reason: String },

    /// `iss` claim missing, not URL-shaped, or not the configured issuer.
    #[error("invalid issuer: {reason}")]
    InvalidIssuer { reason: String },

    /// Token is not an identity token.
    #[error("wrong token purpose: expected token_use={expected}, got {actual}")]
    WrongTokenPurpose { expected: String, actual: String },

    /// Header `kid` is not in the issuer's key set.
    #[error("unknown signing key: {kid}")]
    UnknownSigningKey { kid: String },

    /// Signature, algorithm, expiry or claim verification failed.
    #[error("signature verification failed: {reason}")]
    SignatureInvalid { reason: String },

    /// Key set could not be fetched or parsed.
    #[error("key set unavailable from {url}: {message}")]
    KeySetUnavailable { url: String, message: String },

    /// HTTP verb outside the supported set.
    #[error("invalid HTTP verb {verb}; allowed verbs are GET, POST, PUT, PATCH, HEAD, DELETE, OPTIONS, *")]
    InvalidVerb { verb: String },

    /// Resource path outside the allowed character class.
    #[error("invalid resource path: {path}; path should match ^[/.a-zA-Z0-9-*]+$")]
    InvalidResourcePath { path: String },

    /// Policy has no statements.
    #[error("no statements defined for the policy")]
    EmptyPolicy,

    /// Inbound method identifier could not be parsed.
    #[error("invalid method ARN {arn}: {reason}")]
    InvalidMethodArn { arn: String, reason: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl AuthzError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Operator input / config
            Self::Config { .. } => 2,
            Self::InvalidMethodArn { .. } => 2,

            // Policy construction defects
            Self::InvalidVerb { .. } => 2,
            Self::InvalidResourcePath { .. } => 2,
            Self::EmptyPolicy => 2,

            // Token rejected
            Self::MalformedToken { .. } => 3,
            Self::InvalidIssuer { .. } => 3,
            Self::WrongTokenPurpose { .. } => 3,
            Self::UnknownSigningKey { .. } => 3,
            Self::SignatureInvalid { .. } => 3,

            // Network/transient
            Self::KeySetUnavailable { .. } => 4,
        }
    }

    /// Whether a later request may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeySetUnavailable { .. })
    }

    /// Whether the error comes from the authorizer's own policy construction rather than
    /// from caller input.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::InvalidVerb { .. } | Self::InvalidResourcePath { .. } | Self::EmptyPolicy
        )
    }

    /// Stable identifier for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedToken { .. } => "malformed_token",
            Self::InvalidIssuer { .. } => "invalid_issuer",
            Self::WrongTokenPurpose { .. } => "wrong_token_purpose",
            Self::UnknownSigningKey { .. } => "unknown_signing_key",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::KeySetUnavailable { .. } => "key_set_unavailable",
            Self::InvalidVerb { .. } => "invalid_verb",
            Self::InvalidResourcePath { .. } => "invalid_resource_path",
            Self::EmptyPolicy => "empty_policy",
            Self::InvalidMethodArn { .. } => "invalid_method_arn",
            Self::Config { .. } => "config",
        }
    }
}

/// Result type for authorizer operations.
pub type AuthzResult<T> = Result<T, AuthzError>;
