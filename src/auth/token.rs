//! Stateless session tokens.
//!
//! Wire form: `base64url(claims json) "." base64url(HMAC-SHA256(claims part))`,
//! both unpadded. Nothing about a token is stored server-side.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const MAC_LEN: usize = 32;
const MAX_TOKEN_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,

    #[error("token malformed")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SigningKeyError {
    #[error("signing key too short: got {actual} bytes, need at least {minimum}")]
    TooShort { actual: usize, minimum: usize },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Claims {
    /// Public id of the user. Never the numeric row id.
    pid: String,
    /// Expiry, unix seconds.
    exp: i64,
}

/// Mints and checks session tokens with a process-wide secret.
#[derive(Clone)]
pub struct TokenCodec {
    key: Arc<[u8]>,
    lifetime: Duration,
}

impl TokenCodec {
    pub const MIN_KEY_LENGTH: usize = 32;

    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Result<Self, SigningKeyError> {
        let secret = secret.as_ref();
        if secret.len() < Self::MIN_KEY_LENGTH {
            return Err(SigningKeyError::TooShort {
                actual: secret.len(),
                minimum: Self::MIN_KEY_LENGTH,
            });
        }
        Ok(Self {
            key: Arc::from(secret),
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn issue(&self, public_id: &str) -> String {
        self.issue_at(public_id, Utc::now())
    }

    pub fn issue_at(&self, public_id: &str, now: DateTime<Utc>) -> String {
        let claims = Claims {
            pid: public_id.to_string(),
            exp: now
                .checked_add_signed(self.lifetime)
                .map_or(i64::MAX, |expiry| expiry.timestamp()),
        };
        // Serializing two plain fields cannot fail.
        let json = serde_json::to_vec(&claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, signature)
    }

    /// Returns the public id bound to `token`.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Signature is checked before anything inside the payload is looked at.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<String, TokenError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(TokenError::Malformed);
        }

        let mut parts = token.split('.');
        let (payload, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(p), Some(s), None) if !p.is_empty() && !s.is_empty() => (p, s),
            _ => return Err(TokenError::Malformed),
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;
        if signature.len() != MAC_LEN {
            return Err(TokenError::Malformed);
        }

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        if mac.verify_slice(&signature).is_err() {
            tracing::debug!("Session token signature mismatch");
            return Err(TokenError::Malformed);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)?;
        if claims.pid.is_empty() {
            return Err(TokenError::Malformed);
        }

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims.pid)
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length; ours is at least MIN_KEY_LENGTH.
        <HmacSha256 as Mac>::new_from_slice(&self.key).unwrap_or_else(|_| unreachable!())
    }

    fn sign(&self, data: &[u8]) -> [u8; MAC_LEN] {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("key_length", &self.key.len())
            .field("lifetime", &self.lifetime)
            .finish()
    }
}
