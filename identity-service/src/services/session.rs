use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use super::error::AuthError;
use super::token::{Claims, TokenCodec, TokenError, TokenKind};
use crate::config::TokenConfig;

/// Token pair returned to the client.
#[derive(Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "Bearer")]
    pub token_type: String,
    /// Access token lifetime in seconds
    #[schema(example = 900)]
    pub expires_in: i64,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Issues, validates and rotates access/refresh token pairs.
#[derive(Clone)]
pub struct SessionManager {
    codec: TokenCodec,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SessionManager {
    pub fn new(codec: TokenCodec, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            codec,
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &TokenConfig) -> Result<Self, TokenError> {
        let codec = TokenCodec::new(&config.signing_secret)?;
        let access_ttl = Duration::try_minutes(config.access_token_ttl_minutes)
            .ok_or(TokenError::TtlOutOfRange)?;
        let refresh_ttl =
            Duration::try_days(config.refresh_token_ttl_days).ok_or(TokenError::TtlOutOfRange)?;

        tracing::info!(
            access_ttl_minutes = config.access_token_ttl_minutes,
            refresh_ttl_days = config.refresh_token_ttl_days,
            "Session manager initialized with HS256 signing"
        );

        Ok(Self::new(codec, access_ttl, refresh_ttl))
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Issue a fresh access/refresh pair for `subject`.
    pub fn issue(&self, subject: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = self.codec.encode(subject, TokenKind::Access, self.access_ttl)?;
        let refresh_token = self
            .codec
            .encode(subject, TokenKind::Refresh, self.refresh_ttl)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_ttl_seconds(),
        })
    }

    /// Validate an access token presented on a request.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        self.decode_kind(token, TokenKind::Access)
    }

    /// Exchange a valid refresh token for a brand new pair.
    ///
    /// The old refresh token is not tracked and stays usable until it expires.
    pub fn refresh(&self, token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.decode_kind(token, TokenKind::Refresh)?;
        tracing::debug!(subject = %claims.sub, "Rotating token pair");
        self.issue(claims.sub)
    }

    fn decode_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.codec.decode(token).map_err(|e| {
            tracing::debug!(reason = %e, "Token rejected");
            AuthError::Unauthenticated
        })?;

        if claims.typ != expected {
            tracing::debug!(expected = ?expected, actual = ?claims.typ, "Token kind mismatch");
            return Err(AuthError::Unauthenticated);
        }

        Ok(claims)
    }
}
