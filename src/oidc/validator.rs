//! ID token verification.

use anyhow::{anyhow, Result};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::cache::{KeyCache, LookupError};
use super::claims::ValidatedClaims;
use super::config::VerifierConfig;
use super::jwks::{FetchError, HttpKeySetFetcher, KeySetFetcher};
use crate::clock::{Clock, SystemClock};

/// Signing algorithms accepted for ID tokens.
pub const ACCEPTED_ALGORITHMS: [Algorithm; 3] =
    [Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];

/// Reason a token was rejected.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Not a well-formed token, or no `kid` in its header.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// The key set could not be fetched.
    #[error("signing keys unavailable: {0}")]
    KeyUnavailable(#[source] FetchError),

    /// The token references a key absent from the current key set.
    #[error("unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("invalid signature: {0}")]
    BadSignature(String),

    #[error("token has expired")]
    Expired,

    /// `nbf` or `iat` lies in the future.
    #[error("token is not yet valid")]
    Premature,

    #[error("audience does not include '{0}'")]
    BadAudience(String),

    #[error("unexpected issuer '{}'", .0.as_deref().unwrap_or("<missing>"))]
    BadIssuer(Option<String>),
}

impl VerificationError {
    /// True when the failure comes from the provider's infrastructure rather
    /// than from the token itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, VerificationError::KeyUnavailable(_))
    }
}

impl From<LookupError> for VerificationError {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::NotFound(kid) => VerificationError::UnknownKey(kid),
            LookupError::Fetch(e) => VerificationError::KeyUnavailable(e),
        }
    }
}

/// Verifies ID tokens for one issuer and client.
///
/// Share a single verifier (e.g. behind an `Arc`) across requests so they
/// share its key cache.
pub struct TokenVerifier {
    issuer: String,
    client_id: String,
    leeway_secs: i64,
    cache: KeyCache,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Create a verifier that fetches keys over HTTP and uses the system clock.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow!("Invalid verifier configuration: {}", e))?;

        let fetcher = HttpKeySetFetcher::new(Duration::from_secs(config.http_timeout_secs))?;

        Ok(Self::with_parts(
            config,
            Arc::new(fetcher),
            Arc::new(SystemClock),
        ))
    }

    /// Create a verifier with a custom key fetcher and clock.
    pub fn with_parts(
        config: &VerifierConfig,
        fetcher: Arc<dyn KeySetFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = KeyCache::new(
            config.jwks_url(),
            Duration::from_secs(config.cache_ttl_secs),
            fetcher,
            Arc::clone(&clock),
        );

        Self {
            issuer: config.issuer.clone(),
            client_id: config.client_id.clone(),
            leeway_secs: i64::try_from(config.clock_skew_secs).unwrap_or(i64::MAX),
            cache,
            clock,
        }
    }

    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Verify a token against the configured client ID and issuer.
    pub async fn verify(&self, token: &str) -> Result<ValidatedClaims, VerificationError> {
        self.verify_with(token, &self.client_id, &self.issuer).await
    }

    /// Verify a token against an explicit client ID and issuer.
    pub async fn verify_with(
        &self,
        token: &str,
        client_id: &str,
        issuer: &str,
    ) -> Result<ValidatedClaims, VerificationError> {
        let result = self.run(token, client_id, issuer).await;

        match &result {
            Ok(claims) => debug!(sub = ?claims.sub, "ID token verified"),
            Err(e) if e.is_infrastructure() => {
                warn!(error = %e, url = %self.cache.jwks_url(), "Token verification unavailable")
            }
            Err(e) => debug!(error = %e, "ID token rejected"),
        }

        result
    }

    async fn run(
        &self,
        token: &str,
        client_id: &str,
        issuer: &str,
    ) -> Result<ValidatedClaims, VerificationError> {
        // Unverified pass: only the routing information is used.
        let header =
            decode_header(token).map_err(|e| VerificationError::Malformed(e.to_string()))?;

        if !ACCEPTED_ALGORITHMS.contains(&header.alg) {
            return Err(VerificationError::BadSignature(format!(
                "algorithm {:?} is not accepted",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| VerificationError::Malformed("missing kid in header".to_string()))?;

        debug!(kid = %kid, alg = ?header.alg, "Verifying ID token");

        let key = self.cache.lookup(&kid).await?;

        // Verified pass: the allow-list is enforced again by the decoder,
        // independent of what the first pass read.
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = ACCEPTED_ALGORITHMS.to_vec();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let claims = decode::<ValidatedClaims>(token, key.decoding_key(), &validation)
            .map_err(classify_decode_error)?
            .claims;

        self.check_claims(&claims, client_id, issuer)?;

        Ok(claims)
    }

    fn check_claims(
        &self,
        claims: &ValidatedClaims,
        client_id: &str,
        issuer: &str,
    ) -> Result<(), VerificationError> {
        let now = self.clock.now().timestamp();

        match claims.exp {
            Some(exp) if exp.saturating_add(self.leeway_secs) > now => {}
            _ => return Err(VerificationError::Expired),
        }

        let latest_start = now.saturating_add(self.leeway_secs);
        if [claims.nbf, claims.iat]
            .into_iter()
            .flatten()
            .any(|t| t > latest_start)
        {
            return Err(VerificationError::Premature);
        }

        if !claims.aud.contains(client_id) {
            return Err(VerificationError::BadAudience(client_id.to_string()));
        }

        if claims.iss.as_deref() != Some(issuer) {
            return Err(VerificationError::BadIssuer(claims.iss.clone()));
        }

        Ok(())
    }
}

fn classify_decode_error(err: JwtError) -> VerificationError {
    match err.kind() {
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            VerificationError::Malformed(err.to_string())
        }
        _ => VerificationError::BadSignature(err.to_string()),
    }
}
