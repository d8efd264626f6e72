pub mod auth;

pub use auth::{
    AuthResponse, CheckEmailRequest, CheckEmailResponse, GoogleAuthResponse, GoogleCallbackQuery,
    LoginRequest, OAuthRequest, RefreshRequest, RegisterRequest,
};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "Invalid email or password")]
    pub error: String,
    /// Per-field messages, present on validation failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}
