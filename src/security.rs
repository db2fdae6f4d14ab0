use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::constants::SESSION_TOKEN_LEN;

type HmacSha256 = Hmac<Sha256>;

// =============================================================================
// Password Hashing
// =============================================================================

/// Hash a password with a random per-user salt plus the server pepper.
///
/// Output format: `"{salt}${hex_digest}"` where
/// `digest = SHA256(salt || password || pepper)`. The pepper lives in an
/// environment variable, so a store breach alone does not allow offline
/// cracking against the raw hashes.
pub fn hash_password(password: &str, pepper: &str) -> String {
    let salt: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    format!("{}${}", salt, digest_password(&salt, password, pepper))
}

/// Verify a password against a stored `"{salt}${hex}"` hash
pub fn verify_password(password: &str, pepper: &str, stored: &str) -> bool {
    let Some((salt, expected)) = stored.split_once('$') else {
        return false;
    };
    // Compare through HMAC to avoid a timing side channel on the hex strings
    constant_time_eq(&digest_password(salt, password, pepper), expected)
}

fn digest_password(salt: &str, password: &str, pepper: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

// =============================================================================
// Session Tokens
// =============================================================================

/// Generate a raw session token handed to the client once
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Keyed hash of a session token for storage.
///
/// HMAC rather than a plain digest: without the server key an attacker
/// holding the store cannot mint lookups for forged tokens.
pub fn hash_token(token: &str, pepper: &str) -> String {
    // new_from_slice only fails for unusable key lengths, which HMAC-SHA256
    // does not have
    let mut mac = HmacSha256::new_from_slice(pepper.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new_from_slice(b"momento").unwrap());
    mac.update(token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time string comparison built on HMAC's verify primitive
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut mac = match HmacSha256::new_from_slice(b"momento-eq") {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(a.as_bytes());
    let tag = mac.finalize().into_bytes();

    let mut mac2 = match HmacSha256::new_from_slice(b"momento-eq") {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac2.update(b.as_bytes());
    mac2.verify_slice(&tag).is_ok()
}
