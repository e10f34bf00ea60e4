//! Salted, iterated SHA-256 password hashing.
//!
//! Stored format: `sha256$<iterations>$<salt-hex>$<digest-hex>`.

use rand::RngCore;
use sha2::{Digest, Sha256};

use super::constant_time_compare;

const SCHEME: &str = "sha256";
const DEFAULT_ITERATIONS: u32 = 10_000;
const SALT_LEN: usize = 16;

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn derive(password: &str, salt: &[u8], iterations: u32) -> Vec<u8> {
    let mut digest = Sha256::new()
        .chain_update(salt)
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..iterations {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt)
            .finalize();
    }
    digest.to_vec()
}

/// Hash a password with a fresh random salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let digest = derive(password, &salt, DEFAULT_ITERATIONS);
    format!(
        "{}${}${}${}",
        SCHEME,
        DEFAULT_ITERATIONS,
        to_hex(&salt),
        to_hex(&digest)
    )
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Check a password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iterations, salt, digest] = parts.as_slice() else {
        return false;
    };
    if *scheme != SCHEME {
        return false;
    }
    let (Ok(iterations), Some(salt)) = (iterations.parse::<u32>(), from_hex(salt)) else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let computed = to_hex(&derive(password, &salt, iterations));
    constant_time_compare(&computed, digest)
}
