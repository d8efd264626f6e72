//! PKCE (RFC 7636) helpers for the authorization-code flow.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};

/// 32 random bytes, base64url encoded (43 characters).
pub fn generate_code_verifier() -> String {
    random_url_token()
}

/// S256 challenge for a verifier.
pub fn code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Opaque value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    random_url_token()
}

fn random_url_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
