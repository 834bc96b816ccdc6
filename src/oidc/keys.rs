//! Conversion of JWK descriptors into RSA verification keys.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::DecodingKey;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::jwks::{Jwk, JwkSet};

/// Materialized keys by key ID.
pub type KeyMap = HashMap<String, Arc<MaterializedKey>>;

/// An RSA public key built from a JWK, ready for signature verification.
pub struct MaterializedKey {
    kid: String,
    alg: Option<String>,
    key: DecodingKey,
}

impl MaterializedKey {
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Algorithm advertised by the descriptor. Informational only.
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }
}

impl fmt::Debug for MaterializedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaterializedKey")
            .field("kid", &self.kid)
            .field("alg", &self.alg)
            .finish_non_exhaustive()
    }
}

/// Why a descriptor was left out of the key map.
#[derive(Debug, Error, PartialEq, Eq)]
enum SkipReason {
    #[error("unsupported key type '{0}'")]
    UnsupportedKeyType(String),
    #[error("encryption key")]
    EncryptionKey,
    #[error("missing kid")]
    MissingKid,
    #[error("missing RSA component '{0}'")]
    MissingComponent(&'static str),
    #[error("RSA component '{0}' is not valid base64url")]
    InvalidEncoding(&'static str),
    #[error("exponent does not fit in a signed 64-bit integer")]
    ExponentTooLarge,
    #[error("RSA component '{0}' is zero")]
    ZeroComponent(&'static str),
}

/// Build verification keys for every usable descriptor in `key_set`.
///
/// Unusable descriptors are skipped, never fatal. When two descriptors share
/// a `kid` the later one wins.
pub fn materialize(key_set: &JwkSet) -> KeyMap {
    let mut keys = KeyMap::with_capacity(key_set.keys.len());

    for jwk in &key_set.keys {
        match materialize_key(jwk) {
            Ok(key) => {
                debug!(kid = %key.kid, alg = ?key.alg, "Loaded JWK");
                keys.insert(key.kid.clone(), Arc::new(key));
            }
            Err(reason) => {
                warn!(
                    kid = ?jwk.kid,
                    kty = %jwk.kty,
                    reason = %reason,
                    "Skipping unusable JWK"
                );
            }
        }
    }

    keys
}

fn materialize_key(jwk: &Jwk) -> Result<MaterializedKey, SkipReason> {
    if jwk.kty != "RSA" {
        return Err(SkipReason::UnsupportedKeyType(jwk.kty.clone()));
    }
    if jwk.key_use.as_deref() == Some("enc") {
        return Err(SkipReason::EncryptionKey);
    }
    let kid = jwk.kid.clone().ok_or(SkipReason::MissingKid)?;

    let n = decode_component(jwk.n.as_deref(), "n")?;
    let e = decode_component(jwk.e.as_deref(), "e")?;

    let exponent = exponent_from_be_bytes(&e).ok_or(SkipReason::ExponentTooLarge)?;
    if exponent == 0 {
        return Err(SkipReason::ZeroComponent("e"));
    }

    let modulus = strip_leading_zeros(&n);
    if modulus.is_empty() {
        return Err(SkipReason::ZeroComponent("n"));
    }

    let exponent_bytes = exponent.to_be_bytes();
    let key = DecodingKey::from_rsa_raw_components(modulus, strip_leading_zeros(&exponent_bytes));

    Ok(MaterializedKey {
        kid,
        alg: jwk.alg.clone(),
        key,
    })
}

fn decode_component(value: Option<&str>, name: &'static str) -> Result<Vec<u8>, SkipReason> {
    let value = value.ok_or(SkipReason::MissingComponent(name))?;
    // Some providers pad despite RFC 7518.
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| SkipReason::InvalidEncoding(name))
}

/// Read a big-endian unsigned exponent of any encoded length.
///
/// Returns `None` when the value exceeds `i64::MAX`.
fn exponent_from_be_bytes(bytes: &[u8]) -> Option<u64> {
    let significant = strip_leading_zeros(bytes);
    if significant.len() > 8 {
        return None;
    }
    let exponent = significant
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
    (exponent <= i64::MAX as u64).then_some(exponent)
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}
