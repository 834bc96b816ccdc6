//! Verifier configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::cache::DEFAULT_CACHE_TTL_SECS;
use super::jwks::DEFAULT_HTTP_TIMEOUT_SECS;

/// Token verification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifierConfig {
    /// Token issuer (iss claim). Must match exactly.
    /// Example: "https://cognito-idp.us-east-1.amazonaws.com/us-east-1_AbCdEf"
    #[serde(default)]
    pub issuer: String,

    /// OAuth client ID. Must appear in the aud claim.
    #[serde(default)]
    pub client_id: String,

    /// JWKS endpoint URL. Defaults to `{issuer}/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_url: Option<String>,

    /// Lifetime of a fetched key set in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Clock skew tolerance in seconds for exp/nbf/iat validation.
    #[serde(default)]
    pub clock_skew_secs: u64,

    /// Timeout for a JWKS request in seconds.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

fn default_cache_ttl() -> u64 {
    DEFAULT_CACHE_TTL_SECS
}

fn default_http_timeout() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            client_id: String::new(),
            jwks_url: None,
            cache_ttl_secs: default_cache_ttl(),
            clock_skew_secs: 0,
            http_timeout_secs: default_http_timeout(),
        }
    }
}

/// Issuer URL of a Cognito user pool.
pub fn cognito_issuer(region: &str, user_pool_id: &str) -> String {
    format!("https://cognito-idp.{}.amazonaws.com/{}", region, user_pool_id)
}

impl VerifierConfig {
    /// Configuration for ID tokens issued by a Cognito user pool.
    pub fn cognito(region: &str, user_pool_id: &str, client_id: &str) -> Self {
        Self {
            issuer: cognito_issuer(region, user_pool_id),
            client_id: client_id.to_string(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Effective JWKS endpoint.
    pub fn jwks_url(&self) -> String {
        match self.jwks_url {
            Some(ref url) => url.clone(),
            None => format!(
                "{}/.well-known/jwks.json",
                self.issuer.trim_end_matches('/')
            ),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_empty() {
            return Err("issuer is required".to_string());
        }

        if self.client_id.is_empty() {
            return Err("client_id is required".to_string());
        }

        if !is_http_url(&self.issuer) {
            return Err("issuer must be a valid HTTP(S) URL".to_string());
        }

        if !is_http_url(&self.jwks_url()) {
            return Err("jwks_url must be a valid HTTP(S) URL".to_string());
        }

        if self.cache_ttl_secs == 0 {
            return Err("cache_ttl_secs must be greater than zero".to_string());
        }

        if self.http_timeout_secs == 0 {
            return Err("http_timeout_secs must be greater than zero".to_string());
        }

        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("https://") || url.starts_with("http://")
}

/// Partial configuration overlaid onto a loaded [`VerifierConfig`].
///
/// Built from command-line flags; unset fields leave the target untouched.
#[derive(Debug, Clone, Default)]
pub struct VerifierConfigOverrides {
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub jwks_url: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub clock_skew_secs: Option<u64>,
    pub http_timeout_secs: Option<u64>,
}

impl VerifierConfigOverrides {
    /// Apply the set fields to an existing config.
    pub fn apply_to(&self, config: &mut VerifierConfig) {
        if let Some(ref issuer) = self.issuer {
            config.issuer = issuer.clone();
        }
        if let Some(ref client_id) = self.client_id {
            config.client_id = client_id.clone();
        }
        if let Some(ref jwks_url) = self.jwks_url {
            config.jwks_url = Some(jwks_url.clone());
        }
        if let Some(ttl) = self.cache_ttl_secs {
            config.cache_ttl_secs = ttl;
        }
        if let Some(skew) = self.clock_skew_secs {
            config.clock_skew_secs = skew;
        }
        if let Some(timeout) = self.http_timeout_secs {
            config.http_timeout_secs = timeout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = VerifierConfig::default();
        assert_eq!(config.cache_ttl_secs, 86_400);
        assert_eq!(config.clock_skew_secs, 0);
        assert_eq!(config.http_timeout_secs, 10);
        assert!(config.jwks_url.is_none());
    }

    #[test]
    fn test_cognito_urls() {
        let config = VerifierConfig::cognito("eu-west-1", "eu-west-1_AbCdEf", "client-x");
        assert_eq!(
            config.issuer,
            "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_AbCdEf"
        );
        assert_eq!(
            config.jwks_url(),
            "https://cognito-idp.eu-west-1.amazonaws.com/eu-west-1_AbCdEf/.well-known/jwks.json"
        );
        assert_eq!(config.client_id, "client-x");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = VerifierConfig::default();
        assert!(config.validate().is_err()); // missing issuer

        config.issuer = "https://issuer.example".to_string();
        assert!(config.validate().is_err()); // missing client_id

        config.client_id = "client-x".to_string();
        assert!(config.validate().is_ok());

        config.jwks_url = Some("ftp://issuer.example/keys".to_string());
        assert!(config.validate().is_err());

        config.jwks_url = None;
        config.cache_ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply() {
        let mut config = VerifierConfig::cognito("us-east-1", "us-east-1_pool", "client-x");
        let overrides = VerifierConfigOverrides {
            jwks_url: Some("https://keys.example/jwks.json".to_string()),
            clock_skew_secs: Some(30),
            ..Default::default()
        };

        overrides.apply_to(&mut config);

        assert_eq!(config.jwks_url(), "https://keys.example/jwks.json");
        assert_eq!(config.clock_skew_secs, 30);
        assert_eq!(config.client_id, "client-x"); // unchanged
        assert_eq!(config.cache_ttl_secs, 86_400); // unchanged
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"issuer": "https://issuer.example", "client_id": "client-x", "cache_ttl_secs": 600}}"#
        )
        .unwrap();

        let config = VerifierConfig::from_file(file.path()).unwrap();
        assert_eq!(config.issuer, "https://issuer.example");
        assert_eq!(config.cache_ttl_secs, 600);
        assert_eq!(config.http_timeout_secs, 10);
    }

    #[test]
    fn test_from_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"issuer": "https://issuer.example", "audience": "x"}}"#).unwrap();

        assert!(VerifierConfig::from_file(file.path()).is_err());
    }
}
