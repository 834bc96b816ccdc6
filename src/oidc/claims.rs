//! Claim set of a verified ID token and the caller identity derived from it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Payload of a token that passed signature and claim validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatedClaims {
    /// Subject (user identifier)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience (can be string or array)
    #[serde(default, skip_serializing_if = "Audience::is_none")]
    pub aud: Audience,
    /// Expiration time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    /// Cognito user name
    #[serde(
        default,
        rename = "cognito:username",
        skip_serializing_if = "Option::is_none"
    )]
    pub username: Option<String>,
    /// "id" for ID tokens, "access" for access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_use: Option<String>,
    /// Additional claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Audience::None)
    }
}

/// Caller identity handed to the request layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Principal ID, taken from `sub`.
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    /// Flat string view of the scalar claims.
    pub claims: HashMap<String, String>,
}

impl ValidatedClaims {
    /// Project the claims into a caller identity. `None` without a subject.
    pub fn identity(&self) -> Option<Identity> {
        let user_id = self.sub.clone()?;

        Some(Identity {
            user_id,
            email: self.email.clone(),
            username: self.username.clone(),
            claims: build_claims_map(self),
        })
    }
}

/// Build a flat map of claims for request context.
fn build_claims_map(claims: &ValidatedClaims) -> HashMap<String, String> {
    let mut map = HashMap::new();

    if let Some(ref sub) = claims.sub {
        map.insert("sub".to_string(), sub.clone());
    }
    if let Some(ref iss) = claims.iss {
        map.insert("iss".to_string(), iss.clone());
    }
    if let Some(ref email) = claims.email {
        map.insert("email".to_string(), email.clone());
    }
    if let Some(verified) = claims.email_verified {
        map.insert("email_verified".to_string(), verified.to_string());
    }
    if let Some(ref username) = claims.username {
        map.insert("username".to_string(), username.clone());
    }
    if let Some(exp) = claims.exp {
        map.insert("exp".to_string(), exp.to_string());
    }
    if let Some(iat) = claims.iat {
        map.insert("iat".to_string(), iat.to_string());
    }

    // Nested values are left out
    for (key, value) in &claims.extra {
        match value {
            serde_json::Value::String(s) => {
                map.insert(key.clone(), s.clone());
            }
            serde_json::Value::Number(n) => {
                map.insert(key.clone(), n.to_string());
            }
            serde_json::Value::Bool(b) => {
                map.insert(key.clone(), b.to_string());
            }
            _ => {}
        }
    }

    map
}
