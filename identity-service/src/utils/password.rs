use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use uuid::Uuid;

use crate::config::HashingConfig;

/// Plaintext password. Never shows up in `Debug` output or logs.
#[derive(Clone)]
pub struct Password(SecretString);

impl Password {
    pub fn new(password: String) -> Self {
        Self(SecretString::new(password))
    }

    pub fn as_str(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Argon2 PHC string (`$argon2id$v=19$...`).
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHashString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHashString([REDACTED])")
    }
}

/// Salted one-way password hashing (Argon2id).
#[derive(Clone)]
pub struct CredentialHasher {
    argon2: Argon2<'static>,
    /// Hash of a throwaway secret under the configured cost, verified against
    /// when there is no stored hash so both paths do the same work.
    decoy_hash: PasswordHashString,
}

impl CredentialHasher {
    pub fn new(config: &HashingConfig) -> Result<Self, anyhow::Error> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(|e| anyhow::anyhow!("Invalid password hashing parameters: {}", e))?;

        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let decoy_hash = argon2
            .hash_password(Uuid::new_v4().as_bytes(), &SaltString::generate(&mut OsRng))
            .map_err(|e| anyhow::anyhow!("Failed to prepare decoy hash: {}", e))?
            .to_string();

        Ok(Self {
            argon2,
            decoy_hash: PasswordHashString::new(decoy_hash),
        })
    }

    /// Hash a password with a freshly generated salt.
    ///
    /// The salt is embedded in the output, so hashing the same password twice
    /// yields two different strings that both verify.
    pub fn hash(&self, password: &Password) -> Result<PasswordHashString, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_str().as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();

        Ok(PasswordHashString::new(password_hash))
    }

    /// Verify a password against a stored hash.
    ///
    /// Returns `false` for a mismatch, an empty password, or a hash that does
    /// not parse. Parameters are read from the hash itself, so hashes created
    /// under older cost settings keep verifying. The final comparison is
    /// constant-time.
    pub fn verify(&self, password: &Password, password_hash: &PasswordHashString) -> bool {
        if password.is_empty() {
            return false;
        }

        let Ok(parsed_hash) = PasswordHash::new(password_hash.as_str()) else {
            tracing::warn!("Stored credential secret is not a valid PHC string");
            return false;
        };

        self.argon2
            .verify_password(password.as_str().as_bytes(), &parsed_hash)
            .is_ok()
    }

    /// Spend one verification's worth of work for a login that has no stored
    /// hash to check. Always `false`.
    pub fn verify_missing(&self, password: &Password) -> bool {
        let _ = self.verify(password, &self.decoy_hash);
        false
    }
}
