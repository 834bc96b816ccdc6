//! OIDC ID-token verification.
//!
//! Validates RS256-family ID tokens against the identity provider's published
//! JSON Web Key Set. Keys are fetched lazily, materialized into RSA
//! verification keys, and cached as a whole set with a fixed time-to-live.

pub mod clock;
pub mod oidc;

pub use clock::{Clock, SystemClock};
pub use oidc::{
    Identity, KeyCache, TokenVerifier, ValidatedClaims, VerificationError, VerifierConfig,
};

#[cfg(test)]
mod test_support;
