//! Bearer-token authorizer for API gateways.
//!
//! This crate decides whether the bearer of an identity token may invoke an API, providing:
//!
//! - Token parsing without trust (header, claims, issuer)
//! - Key resolution from the issuer's published JWKS, with an optional TTL cache
//! - Signature and claim validation (issuer, `token_use`, expiry, optional audience)
//! - Gateway policy generation scoped to the invoked API and stage
//!
//! # Quick Start
//!
//! ```no_run
//! use gatepost_authz::{Authorizer, AuthorizerConfig, AuthorizerEvent};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let authorizer = Authorizer::from_config(AuthorizerConfig::from_env()?)?;
//!
//! let event = AuthorizerEvent::new(
//!     "Bearer eyJ...",
//!     "arn:aws:execute-api:us-east-1:123456789012:abcdef1234/prod/GET/items",
//! );
//! match authorizer.authorize(&event).await {
//!     Ok(response) => println!("{}", serde_json::to_string(&response)?),
//!     Err(rejection) => eprintln!("{rejection}"), // always "Unauthorized"
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `GATEPOST_USER_POOL_ID` | Trusted pool id (required; legacy fallback `userpool_id`) |
//! | `GATEPOST_EXPECTED_ISSUER` | Exact issuer URL to require (default: unset) |
//! | `GATEPOST_AUDIENCE` | Audience to require (default: unset) |
//! | `GATEPOST_JWKS_TIMEOUT` | Key-set fetch timeout in seconds (default: 5) |
//! | `GATEPOST_JWKS_CACHE_TTL` | Key-set cache TTL in seconds (default: 0, disabled) |
//! | `GATEPOST_JWKS_MIN_REFRESH` | Minimum seconds between forced key-set refreshes (default: 30) |
//! | `GATEPOST_LEEWAY` | Clock-skew tolerance in seconds (default: 0) |

pub mod authorizer;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod jwks;
pub mod method_arn;
pub mod policy;
pub mod resolver;
pub mod token;
pub mod types;
pub mod validate;

// Re-export main types
pub use authorizer::{Authorizer, Outcome, Rejection, Stage};
pub use cache::{KeySetCache, KeySetOrigin};
pub use client::JwksClient;
pub use config::AuthorizerConfig;
pub use error::{AuthzError, AuthzResult, UNAUTHORIZED};
pub use jwks::{Jwk, JwkSet, KeySet, VerificationKey};
pub use method_arn::MethodArn;
pub use policy::{
    ApiScope, AuthPolicy, Conditions, Effect, HttpVerb, PolicyBuilder, PolicyDocument, Statement,
};
pub use resolver::{KeyResolver, KeySource, ResolvedKeys, StaticKeySource};
pub use token::{decode_unverified, DecodedToken, Issuer, TokenClaims};
pub use types::{AuthorizerEvent, AuthorizerResponse, IdentityContext};
pub use validate::{TokenValidator, VerifiedIdentity};
