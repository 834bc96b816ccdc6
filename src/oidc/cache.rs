//! Time-boxed cache of materialized JWKS keys.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::jwks::{FetchError, KeySetFetcher};
use super::keys::{materialize, KeyMap, MaterializedKey};
use crate::clock::Clock;

/// Default lifetime of a fetched key set (24 hours).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

/// How long a failed refresh is reused before the provider is asked again.
pub const FETCH_RETRY_BACKOFF_SECS: i64 = 5;

/// Failure to resolve a key ID.
#[derive(Debug, Error)]
pub enum LookupError {
    /// A fresh key set was fetched and does not contain the key.
    #[error("key '{0}' not found in JWKS")]
    NotFound(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Keys from a single fetch and when they stop being authoritative.
struct CacheEntry {
    keys: KeyMap,
    /// `None` until the first successful fetch.
    expires_at: Option<DateTime<Utc>>,
    /// Most recent failed refresh, reused until its retry time passes.
    last_failure: Option<FailedRefresh>,
}

struct FailedRefresh {
    error: FetchError,
    retry_after: DateTime<Utc>,
}

impl CacheEntry {
    fn fresh_key(&self, kid: &str, now: DateTime<Utc>) -> Option<Arc<MaterializedKey>> {
        match self.expires_at {
            Some(expires_at) if now < expires_at => self.keys.get(kid).cloned(),
            _ => None,
        }
    }
}

/// Process-wide JWKS cache for a single issuer.
///
/// The whole key set shares one expiry and is replaced atomically on refresh,
/// so a lookup never sees keys from two different fetches. Concurrent misses
/// are collapsed into a single fetch.
pub struct KeyCache {
    jwks_url: String,
    ttl: Duration,
    fetcher: Arc<dyn KeySetFetcher>,
    clock: Arc<dyn Clock>,
    entry: RwLock<CacheEntry>,
}

impl KeyCache {
    pub fn new(
        jwks_url: impl Into<String>,
        ttl: Duration,
        fetcher: Arc<dyn KeySetFetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            ttl,
            fetcher,
            clock,
            entry: RwLock::new(CacheEntry {
                keys: KeyMap::new(),
                expires_at: None,
                last_failure: None,
            }),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Resolve `kid` to a verification key, refreshing the key set if it is
    /// expired or does not contain `kid`.
    ///
    /// If the refresh fails and `kid` is still held from an earlier fetch,
    /// that key is returned instead of the error. A failed refresh is not
    /// retried for [`FETCH_RETRY_BACKOFF_SECS`]; lookups in that window get
    /// the last known key or the same error without touching the network.
    ///
    /// Unknown key IDs are not rate-limited: outside a failure window, every
    /// miss on a fresh set costs one fetch under the exclusive lock.
    pub async fn lookup(&self, kid: &str) -> Result<Arc<MaterializedKey>, LookupError> {
        {
            let entry = self.entry.read().await;
            if let Some(key) = entry.fresh_key(kid, self.clock.now()) {
                return Ok(key);
            }
        }

        let mut entry = self.entry.write().await;

        // Another lookup may have refreshed while we waited for the lock.
        if let Some(key) = entry.fresh_key(kid, self.clock.now()) {
            debug!(kid = %kid, "Key loaded by concurrent refresh");
            return Ok(key);
        }

        let now = self.clock.now();
        if let Some(ref failure) = entry.last_failure {
            if now < failure.retry_after {
                debug!(kid = %kid, "JWKS refresh recently failed, not retrying yet");
                return match entry.keys.get(kid) {
                    Some(key) => Ok(Arc::clone(key)),
                    None => Err(failure.error.clone().into()),
                };
            }
        }

        debug!(kid = %kid, url = %self.jwks_url, "JWKS cache miss, refreshing");

        let key_set = match self.fetcher.fetch(&self.jwks_url).await {
            Ok(key_set) => key_set,
            Err(e) => {
                let retry_after =
                    self.clock.now() + chrono::Duration::seconds(FETCH_RETRY_BACKOFF_SECS);
                entry.last_failure = Some(FailedRefresh {
                    error: e.clone(),
                    retry_after,
                });
                if let Some(key) = entry.keys.get(kid) {
                    warn!(
                        kid = %kid,
                        url = %self.jwks_url,
                        error = %e,
                        "JWKS refresh failed, serving last known key"
                    );
                    return Ok(Arc::clone(key));
                }
                warn!(url = %self.jwks_url, error = %e, "JWKS refresh failed");
                return Err(e.into());
            }
        };

        let keys = materialize(&key_set);
        let expires_at = self.expiry_from(self.clock.now());

        info!(
            url = %self.jwks_url,
            key_count = keys.len(),
            expires_at = %expires_at,
            "JWKS cache refreshed"
        );

        *entry = CacheEntry {
            keys,
            expires_at: Some(expires_at),
            last_failure: None,
        };

        entry
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(kid.to_string()))
    }

    /// Number of keys currently held.
    pub async fn len(&self) -> usize {
        self.entry.read().await.keys.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Expiry of the current key set, `None` before the first fetch.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.entry.read().await.expires_at
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
