//! One-way credential hashing with Argon2id.
//!
//! Hashes are stored as PHC strings, which embed the salt and cost
//! parameters, so verification never needs the config that produced them.

use crate::config::HashCost;
use crate::error::{LedgerError, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;

fn hasher(cost: HashCost) -> Result<Argon2<'static>> {
    let params = Params::new(cost.memory_kib, cost.iterations, Params::DEFAULT_P_COST, None)
        .map_err(|e| LedgerError::invalid(format!("argon2 parameters: {}", e)))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hashes `credential` with a fresh random salt.
pub fn hash_credential(credential: &str, cost: HashCost) -> Result<String> {
    if credential.is_empty() {
        return Err(LedgerError::invalid("credential must not be empty"));
    }

    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher(cost)?
        .hash_password(credential.as_bytes(), &salt)
        .map_err(|e| LedgerError::invalid(format!("hashing credential: {}", e)))?
        .to_string();
    Ok(hash)
}

/// Returns `true` if `credential` matches the stored PHC `hash`.
///
/// A malformed stored hash never matches.
pub fn verify_credential(credential: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(credential.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Does the Argon2 work of a verification against a hash made with `cost`,
/// for lookups that found no stored hash. Never matches.
///
/// Unknown accounts then take as long to reject as wrong credentials.
pub fn verify_missing(credential: &str, cost: HashCost) -> bool {
    let salt = SaltString::generate(&mut OsRng);
    if let Ok(argon) = hasher(cost) {
        let _ = argon.hash_password(credential.as_bytes(), &salt);
    }
    false
}
