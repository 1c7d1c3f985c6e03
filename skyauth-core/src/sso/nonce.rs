//! OIDC nonce helpers.
//!
//! The raw nonce goes back to the client; only its SHA-256 hash travels inside
//! the signed state and to the provider.

use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const NONCE_LENGTH: usize = 32;

/// Random nonce, hex encoded
#[must_use]
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_LENGTH];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Lowercase hex SHA-256 of the raw nonce
#[must_use]
pub fn hash_nonce(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Constant-time check that `raw` hashes to `hashed`
#[must_use]
pub fn verify_nonce(raw: &str, hashed: &str) -> bool {
    hash_nonce(raw).as_bytes().ct_eq(hashed.as_bytes()).into()
}
