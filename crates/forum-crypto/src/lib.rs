//! Forum credential subsystem.
//!
//! Passwords are hashed with Argon2id under a per-user salt that is stored
//! next to the hash. Identity tokens are HS256 JWTs signed with a secret
//! supplied by the caller at construction.
pub mod password;
pub mod token;

pub use password::{
    CredentialError, generate_salt, hash_password, verify_absent_user, verify_password,
};
pub use token::{TokenError, TokenIssuer};
