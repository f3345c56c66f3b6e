//! Account registration input and password handling.
//!
//! Passwords are stored as bcrypt hashes. Hashing and verification are CPU
//! bound, so both run on the blocking pool rather than on an async worker.
use eyre::{Result, WrapErr};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::validator::{self, Validator};

pub const MAX_NAME_BYTES: usize = 500;
pub const MIN_PASSWORD_BYTES: usize = 8;
/// bcrypt ignores everything past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("valid regex")
});

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(
        validator::matches(email, &EMAIL_RX),
        "email",
        "must be a valid email address",
    );
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(
        password.len() >= MIN_PASSWORD_BYTES,
        "password",
        "must be at least 8 bytes long",
    );
    v.check(
        password.len() <= MAX_PASSWORD_BYTES,
        "password",
        "must not be more than 72 bytes long",
    );
}

/// Checks applied to a registration before anything is hashed or stored.
pub fn validate_registration(v: &mut Validator, name: &str, email: &str, password: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(
        name.len() <= MAX_NAME_BYTES,
        "name",
        "must not be more than 500 bytes long",
    );
    validate_email(v, email);
    validate_password_plaintext(v, password);
}

pub async fn hash_password(password: String, cost: u32) -> Result<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .wrap_err("Password hashing task failed")?
        .wrap_err("Failed to hash password")
}

/// Compare a plaintext against a stored hash.
pub async fn verify_password(password: String, password_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
        .await
        .wrap_err("Password verification task failed")?
        .wrap_err("Failed to verify password")
}

/// Cheap structural check of a configured hash (`$2b$12$` + 53 characters).
pub fn looks_like_bcrypt_hash(hash: &str) -> bool {
    hash.len() == 60 && hash.starts_with("$2")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Lowest cost bcrypt accepts; keeps the tests fast.
    const TEST_COST: u32 = 4;

    #[test]
    fn test_registration_messages() {
        let mut v = Validator::new();
        validate_registration(&mut v, "", "not-an-email", "short");
        let errors = v.errors();
        assert_eq!(errors["name"], "must be provided");
        assert_eq!(errors["email"], "must be a valid email address");
        assert_eq!(errors["password"], "must be at least 8 bytes long");

        let mut v = Validator::new();
        validate_registration(&mut v, "Alice", "alice@example.com", &"x".repeat(73));
        assert_eq!(v.errors()["password"], "must not be more than 72 bytes long");
        assert!(!v.errors().contains_key("email"));

        let mut v = Validator::new();
        validate_registration(&mut v, "Alice", "alice@example.com", "pa55word");
        assert!(v.valid());
    }

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hash = hash_password("pa55word".to_string(), TEST_COST)
            .await
            .unwrap();
        assert!(looks_like_bcrypt_hash(&hash));
        assert!(
            verify_password("pa55word".to_string(), hash.clone())
                .await
                .unwrap()
        );
        assert!(!verify_password("wrong-pass".to_string(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_garbage_hash() {
        assert!(
            verify_password("pa55word".to_string(), "not-a-hash".to_string())
                .await
                .is_err()
        );
        assert!(!looks_like_bcrypt_hash("not-a-hash"));
    }
}
