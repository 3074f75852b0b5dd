//! Confirmation tokens: random secret for the emailed link, SHA-256 digest for storage

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Lifetime used when a caller has no specific requirement
pub const DEFAULT_LIFETIME_HOURS: f64 = 72.0;

const TOKEN_BYTES: usize = 32;

/// Freshly generated token. Only `token_hash` is ever persisted.
#[derive(Debug, Clone)]
pub struct ConfirmToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// Generate a 256-bit random token expiring `lifetime_hours` from now.
/// Fractional hours are honoured (0.5 = 30 minutes).
pub fn generate_confirm_token(lifetime_hours: f64) -> ConfirmToken {
    generate_confirm_token_at(lifetime_hours, Utc::now())
}

pub fn generate_confirm_token_at(lifetime_hours: f64, now: DateTime<Utc>) -> ConfirmToken {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    let token = hex::encode(bytes);
    let token_hash = hash_token(&token);

    ConfirmToken {
        token,
        token_hash,
        expires_at: now + lifetime(lifetime_hours),
    }
}

fn lifetime(hours: f64) -> Duration {
    let hours = if hours.is_finite() && hours > 0.0 { hours } else { 0.0 };
    Duration::milliseconds((hours * 3_600_000.0).round() as i64)
}

/// Lowercase hex SHA-256 of the token
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Absent expiry counts as expired
pub fn is_expired(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match expires_at {
        None => true,
        Some(at) => at < now,
    }
}

/// True iff both sides are present, the token has not expired and its digest matches
pub fn verify_token(
    token: &str,
    stored_hash: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let Some(stored_hash) = stored_hash.filter(|h| !h.is_empty()) else {
        return false;
    };
    if token.is_empty() || is_expired(expires_at, now) {
        return false;
    }
    hash_token(token).as_bytes().ct_eq(stored_hash.as_bytes()).into()
}
