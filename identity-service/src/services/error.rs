use service_core::error::AppError;
use thiserror::Error;

use super::oauth::OAuthError;
use super::store::StoreError;
use super::token::TokenError;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] validator::ValidationErrors),

    #[error("User already exists")]
    AlreadyExists,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid token")]
    Unauthenticated,

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Identity store failure: {0}")]
    StoreFailure(anyhow::Error),

    #[error("OAuth exchange failed: {0}")]
    ExchangeFailed(#[from] OAuthError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AuthError::AlreadyExists,
            StoreError::Backend(e) => AuthError::StoreFailure(e),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed | TokenError::SignatureInvalid | TokenError::Expired => {
                AuthError::Unauthenticated
            }
            TokenError::Signing(_) | TokenError::InvalidKey | TokenError::TtlOutOfRange => {
                AuthError::Internal(anyhow::Error::new(err))
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ValidationFailed(e) => AppError::ValidationError(e),
            AuthError::AlreadyExists => AppError::Conflict(anyhow::anyhow!("User already exists")),
            AuthError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            AuthError::Unauthenticated => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            AuthError::UnsupportedProvider(p) => {
                AppError::BadRequest(anyhow::anyhow!("Unsupported provider: {}", p))
            }
            AuthError::StoreFailure(e) => AppError::DatabaseError(e),
            AuthError::ExchangeFailed(OAuthError::EmailNotVerified) => {
                AppError::Unauthorized(anyhow::anyhow!("Email not verified with provider"))
            }
            AuthError::ExchangeFailed(e) => AppError::BadGateway(anyhow::Error::new(e)),
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
