use argon2::Argon2;
use argon2::password_hash::{Output, PasswordHasher, SaltString, rand_core::OsRng};
use thiserror::Error;
use tracing::warn;

/// Fixed material hashed when the account does not exist. 32 zero bytes as
/// the expected output, which no real password produces.
const ABSENT_HASH: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
const ABSENT_SALT: &str = "YWJzZW50LWFjY291bnQ";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("invalid salt: {0}")]
    Salt(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// Generate a fresh random salt (base64, no padding).
/// Each registration gets its own; salts are never shared between users.
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).as_str().to_string()
}

/// Argon2id hash of `password` under `salt`, encoded as base64.
/// Deterministic for a given (password, salt) pair.
pub fn hash_password(password: &str, salt: &str) -> Result<String, CredentialError> {
    Ok(compute(password, salt)?.to_string())
}

/// Recompute the hash and compare it against the stored one.
/// `Output` equality is constant-time.
pub fn verify_password(password: &str, stored_hash: &str, salt: &str) -> bool {
    let expected: Output = match stored_hash.parse() {
        Ok(output) => output,
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            return false;
        }
    };

    match compute(password, salt) {
        Ok(actual) => actual == expected,
        Err(e) => {
            warn!("Password verification failed: {}", e);
            false
        }
    }
}

/// Spend one full verification on a login with no account, so it costs the
/// same as a wrong password. Always false.
pub fn verify_absent_user(password: &str) -> bool {
    verify_password(password, ABSENT_HASH, ABSENT_SALT)
}

fn compute(password: &str, salt: &str) -> Result<Output, CredentialError> {
    let salt = SaltString::from_b64(salt).map_err(|e| CredentialError::Salt(e.to_string()))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CredentialError::Hash(e.to_string()))?;
    hash.hash
        .ok_or_else(|| CredentialError::Hash("argon2 produced no output".into()))
}
