//! Shared fixtures for unit tests: RSA signing keys, fake fetchers, a manual clock.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use crate::clock::Clock;
use crate::oidc::jwks::{FetchError, Jwk, JwkSet, KeySetFetcher};

pub const TEST_KID: &str = "k1";
pub const TEST_ISSUER: &str = "https://issuer.example";
pub const TEST_CLIENT_ID: &str = "client-x";
pub const TEST_JWKS_URL: &str = "https://issuer.example/.well-known/jwks.json";

/// RSA keypair with its public half pre-encoded for a JWK.
pub struct TestKey {
    encoding_key: EncodingKey,
    pub n: String,
    pub e: String,
}

impl TestKey {
    fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = private_key.to_public_key();
        let pem = private_key.to_pkcs1_pem(LineEnding::LF).unwrap();

        Self {
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap(),
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        }
    }

    pub fn jwk(&self, kid: &str) -> Jwk {
        Jwk {
            kty: "RSA".to_string(),
            kid: Some(kid.to_string()),
            alg: Some("RS256".to_string()),
            key_use: Some("sig".to_string()),
            n: Some(self.n.clone()),
            e: Some(self.e.clone()),
        }
    }

    pub fn sign<T: Serialize>(&self, kid: &str, claims: &T) -> String {
        self.sign_with(Algorithm::RS256, kid, claims)
    }

    pub fn sign_with<T: Serialize>(&self, alg: Algorithm, kid: &str, claims: &T) -> String {
        let mut header = Header::new(alg);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &self.encoding_key).unwrap()
    }
}

/// Key generation is slow; every test shares the same two keys.
pub fn test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

pub fn other_test_key() -> &'static TestKey {
    static KEY: OnceLock<TestKey> = OnceLock::new();
    KEY.get_or_init(TestKey::generate)
}

/// Fetcher serving a fixed key set, or failing when unreachable.
pub struct FakeFetcher {
    keys: Mutex<Option<Vec<Jwk>>>,
    calls: AtomicUsize,
    delay: std::time::Duration,
}

impl FakeFetcher {
    pub fn serving(keys: Vec<Jwk>) -> Self {
        Self {
            keys: Mutex::new(Some(keys)),
            calls: AtomicUsize::new(0),
            delay: std::time::Duration::ZERO,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            keys: Mutex::new(None),
            calls: AtomicUsize::new(0),
            delay: std::time::Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the served keys; `None` makes the provider unreachable.
    pub fn set_keys(&self, keys: Option<Vec<Jwk>>) {
        *self.keys.lock().unwrap() = keys;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySetFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<JwkSet, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let keys = self.keys.lock().unwrap().clone();
        match keys {
            Some(keys) => Ok(JwkSet { keys }),
            None => Err(FetchError::transport(url, "connection refused")),
        }
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
