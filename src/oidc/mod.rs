//! OIDC ID-token verification with JWKS support.
//!
//! Provides token validation using JSON Web Key Sets (JWKS) with lazy key
//! rotation and caching.

pub mod cache;
pub mod claims;
pub mod config;
pub mod jwks;
pub mod keys;
pub mod validator;

pub use cache::{KeyCache, LookupError, DEFAULT_CACHE_TTL_SECS, FETCH_RETRY_BACKOFF_SECS};
pub use claims::{Audience, Identity, ValidatedClaims};
pub use config::{cognito_issuer, VerifierConfig, VerifierConfigOverrides};
pub use jwks::{FetchError, HttpKeySetFetcher, Jwk, JwkSet, KeySetFetcher};
pub use keys::{materialize, KeyMap, MaterializedKey};
pub use validator::{TokenVerifier, VerificationError, ACCEPTED_ALGORITHMS};
