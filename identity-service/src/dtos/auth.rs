use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::models::IdentityResponse;
use crate::services::TokenPair;
use crate::utils::normalize_email;

#[derive(Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    #[schema(example = "password123", min_length = 8)]
    pub password: String,

    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "John Doe")]
    pub name: String,
}

impl RegisterRequest {
    /// Trim/lower-case the email and trim the name. The password is left as typed.
    pub fn normalized(self) -> Self {
        Self {
            email: normalize_email(&self.email),
            password: self.password,
            name: self.name.trim().to_string(),
        }
    }
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "user@example.com")]
    pub email: String,

    #[schema(example = "password123")]
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    #[schema(example = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckEmailRequest {
    #[schema(example = "user@example.com")]
    pub email: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckEmailResponse {
    #[schema(example = true)]
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "credentials")]
    pub provider: Option<String>,
}

/// Identity assertion from a trusted front end that already completed OAuth.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct OAuthRequest {
    #[validate(length(min = 1, message = "Provider is required"))]
    #[schema(example = "google")]
    pub provider: String,

    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,

    #[serde(default)]
    #[schema(example = "John Doe")]
    pub name: String,

    #[serde(default)]
    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: IdentityResponse,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GoogleAuthResponse {
    pub user: IdentityResponse,
    pub tokens: TokenPair,
    #[schema(example = false)]
    pub is_new_user: bool,
}

/// Query params from the Google callback.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}
