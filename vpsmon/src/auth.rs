//! Credentials and session tokens: salted SHA-256 password hashes and opaque
//! bearer tokens stored server-side with an expiry.

use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

pub const SESSION_TTL_DAYS: i64 = 7;
pub const MIN_PASSWORD_LEN: usize = 6;

fn digest(salt: &str, password: &str) -> String {
    let mut h = Sha256::new();
    h.update(salt.as_bytes());
    h.update(password.as_bytes());
    hex::encode(h.finalize())
}

/// Hash a password with a fresh random salt. Stored as `salt$hexdigest`.
pub fn hash_password(password: &str) -> String {
    let salt: [u8; 16] = rand::random();
    let salt = hex::encode(salt);
    let hash = digest(&salt, password);
    format!("{salt}${hash}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, hash)) => digest(salt, password) == hash,
        None => false,
    }
}

/// A fresh opaque session token (32 random bytes, hex).
pub fn new_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Unix-seconds expiry for a session created now.
pub fn session_expiry() -> i64 {
    (Utc::now() + Duration::days(SESSION_TTL_DAYS)).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let stored = hash_password("hunter22");
        assert!(verify_password("hunter22", &stored));
        assert!(!verify_password("hunter23", &stored));
    }

    #[test]
    fn salts_differ_per_hash() {
        let a = hash_password("same");
        let b = hash_password("same");
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn garbage_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "no-dollar-sign"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = new_token();
        let b = new_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_is_in_the_future() {
        assert!(session_expiry() > Utc::now().timestamp());
    }
}
