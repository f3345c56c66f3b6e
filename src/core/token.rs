//! Bearer token shape, hashing and generation.
//!
//! Plaintext tokens are 26 characters of unpadded base32 (16 random bytes).
//! Only the SHA-256 hash of a plaintext is ever kept in a store.
use chrono::{DateTime, Duration, Utc};
use data_encoding::BASE32_NOPAD;
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::{
    principal::PrincipalId,
    validator::{self, Validator},
};

pub const TOKEN_LENGTH: usize = 26;

/// Longest lifetime accepted for a configured token (ten years).
pub const MAX_TOKEN_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

static BASE32_RX: Lazy<Regex> = Lazy::new(|| Regex::new("^[A-Z2-7]+$").expect("valid regex"));

/// Purpose a token was issued for. Lookups only match tokens of the
/// requested scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
    Authentication,
}

pub type TokenHash = [u8; 32];

/// A stored token. The plaintext is only populated right after generation.
#[derive(Debug, Clone)]
pub struct Token {
    pub plaintext: Option<String>,
    pub hash: TokenHash,
    pub principal_id: PrincipalId,
    pub expiry: DateTime<Utc>,
    pub scope: TokenScope,
}

impl Token {
    /// Build a stored token from an already known plaintext.
    pub fn from_plaintext(
        plaintext: &str,
        principal_id: PrincipalId,
        ttl: Duration,
        scope: TokenScope,
    ) -> Self {
        Self {
            plaintext: None,
            hash: hash_plaintext(plaintext),
            principal_id,
            expiry: expiry_after(ttl),
            scope,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// Generate a fresh random token. The plaintext is returned exactly once,
/// in [`Token::plaintext`].
pub fn generate_token(principal_id: PrincipalId, ttl: Duration, scope: TokenScope) -> Token {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    let plaintext = BASE32_NOPAD.encode(&bytes);

    Token {
        hash: hash_plaintext(&plaintext),
        plaintext: Some(plaintext),
        principal_id,
        expiry: expiry_after(ttl),
        scope,
    }
}

/// Expiry `ttl` from now, saturating at the latest representable instant.
fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn hash_plaintext(plaintext: &str) -> TokenHash {
    let digest = Sha256::digest(plaintext.as_bytes());
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Structural check applied before any store lookup.
pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(
        plaintext.len() == TOKEN_LENGTH,
        "token",
        "must be 26 bytes long",
    );
    v.check(
        validator::matches(plaintext, &BASE32_RX),
        "token",
        "must only contain base32 characters",
    );
}

/// Convenience wrapper returning whether `plaintext` is well formed.
pub fn is_well_formed(plaintext: &str) -> bool {
    let mut v = Validator::new();
    validate_token_plaintext(&mut v, plaintext);
    v.valid()
}
