//! JWKS (JSON Web Key Set) wire format and fetching.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Display;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default timeout for a single JWKS request in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// JWKS document as published by the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Individual JSON Web Key.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type (RSA, EC)
    pub kty: String,
    /// Key ID
    #[serde(default)]
    pub kid: Option<String>,
    /// Algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Key use (sig, enc)
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    /// RSA modulus (base64url)
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent (base64url)
    #[serde(default)]
    pub e: Option<String>,
}

/// Failure to retrieve a key set.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Connection failure, timeout, or a non-success status.
    #[error("JWKS request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The response body is not a JWKS document.
    #[error("JWKS document from {url} could not be decoded: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub(crate) fn transport(url: &str, reason: impl Display) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(url: &str, reason: impl Display) -> Self {
        FetchError::Decode {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Retrieves the raw key set from a JWKS endpoint.
///
/// Implementations perform exactly one request per call; retrying is left to
/// the caller.
#[async_trait]
pub trait KeySetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError>;
}

/// Fetches key sets over plain HTTP(S) GET.
#[derive(Debug, Clone)]
pub struct HttpKeySetFetcher {
    client: reqwest::Client,
}

impl HttpKeySetFetcher {
    /// Create a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Create a fetcher with a custom HTTP client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeySetFetcher for HttpKeySetFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError> {
        debug!(url = %url, "Fetching JWKS");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::transport(
                url,
                format!("endpoint returned status {}", status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        let jwks: JwkSet = serde_json::from_slice(&body).map_err(|e| FetchError::decode(url, e))?;

        debug!(url = %url, key_count = jwks.keys.len(), "JWKS fetched");

        Ok(jwks)
    }
}
