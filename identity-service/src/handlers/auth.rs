use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;
use validator::Validate;

use crate::{
    dtos::{
        AuthResponse, CheckEmailRequest, CheckEmailResponse, ErrorResponse, LoginRequest,
        OAuthRequest, RefreshRequest, RegisterRequest,
    },
    middleware::AuthUser,
    models::{AuthProvider, IdentityResponse},
    services::{AuthError, TokenPair},
    utils::{JsonBody, Password},
    AppState,
};

/// Check whether an email is registered
#[utoipa::path(
    post,
    path = "/api/v1/auth/check-email",
    request_body = CheckEmailRequest,
    responses(
        (status = 200, description = "Lookup result", body = CheckEmailResponse),
        (status = 400, description = "Invalid request body", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn check_email(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CheckEmailRequest>,
) -> Result<Json<CheckEmailResponse>, AppError> {
    let status = state.local_auth.check_email(&req.email).await?;
    Ok(Json(CheckEmailResponse {
        exists: status.exists,
        provider: status.provider.map(String::from),
    }))
}

/// Register with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Identity created", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 409, description = "User already exists", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (identity, tokens) = state.local_auth.register(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: identity.sanitized(),
            tokens,
        }),
    ))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let password = Password::new(req.password);
    let (identity, tokens) = state.local_auth.authenticate(&req.email, &password).await?;
    Ok(Json(AuthResponse {
        user: identity.sanitized(),
        tokens,
    }))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Token refreshed successfully", body = TokenPair),
        (status = 401, description = "Invalid refresh token", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    let tokens = state
        .sessions
        .refresh(&req.refresh_token)
        .map_err(|e| match e {
            AuthError::Unauthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            other => other.into(),
        })?;
    Ok(Json(tokens))
}

/// Sign in with an identity already verified by a trusted front end
#[utoipa::path(
    post,
    path = "/api/v1/auth/oauth",
    request_body = OAuthRequest,
    responses(
        (status = 200, description = "Identity resolved", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ErrorResponse),
        (status = 401, description = "Invalid federation key", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("federation_api_key" = [])
    )
)]
pub async fn oauth_sign_in(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<OAuthRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    req.validate()?;

    let provider = AuthProvider::from(req.provider.as_str());
    if provider.is_credentials() {
        return Err(AuthError::UnsupportedProvider(provider.to_string()).into());
    }

    let (identity, tokens, _) = state
        .federated_auth
        .resolve_or_create(&provider, &req.email, &req.name, req.avatar_url)
        .await?;

    Ok(Json(AuthResponse {
        user: identity.sanitized(),
        tokens,
    }))
}

/// Current identity for the bearer token
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current identity", body = IdentityResponse),
        (status = 401, description = "Invalid token", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<IdentityResponse>, AppError> {
    let identity = state
        .store
        .find_by_id(claims.sub)
        .await
        .map_err(AuthError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("User not found")))?;

    Ok(Json(identity.sanitized()))
}
