pub mod extract;
pub mod password;
pub mod pkce;

pub use extract::JsonBody;
pub use password::{CredentialHasher, Password, PasswordHashString};

/// Canonical form used for every email lookup and write.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
