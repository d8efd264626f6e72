//! Google OAuth 2.0 authorization-code flow with PKCE.
//!
//! `GET /api/v1/auth/google` sets short-lived state and verifier cookies and
//! redirects to Google; the callback checks the state, exchanges the code and
//! resolves the identity.

use axum::{
    extract::{Query, State},
    response::Redirect,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::{
    config::Environment,
    dtos::{ErrorResponse, GoogleAuthResponse, GoogleCallbackQuery},
    models::AuthProvider,
    services::OAuthCodeExchange,
    utils::pkce,
    AppState,
};
use std::sync::Arc;

pub const STATE_COOKIE: &str = "oauth_state";
pub const VERIFIER_COOKIE: &str = "oauth_verifier";
const COOKIE_PATH: &str = "/api/v1/auth/google";

fn google_exchange(state: &AppState) -> Result<Arc<dyn OAuthCodeExchange>, AppError> {
    state
        .federated_auth
        .exchange(&AuthProvider::federated("google"))
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Google sign-in is not configured")))
}

fn flow_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(COOKIE_PATH)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(10))
        .build()
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path(COOKIE_PATH).build()
}

/// Start Google sign-in
#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    responses(
        (status = 303, description = "Redirect to Google"),
        (status = 404, description = "Google sign-in is not configured", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
pub async fn google_login(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let exchange = google_exchange(&state)?;

    let csrf_state = pkce::generate_state();
    let verifier = pkce::generate_code_verifier();
    let url = exchange.authorization_url(&csrf_state, &pkce::code_challenge(&verifier));

    let secure = state.config.environment == Environment::Prod;
    let jar = jar
        .add(flow_cookie(STATE_COOKIE, csrf_state, secure))
        .add(flow_cookie(VERIFIER_COOKIE, verifier, secure));

    Ok((jar, Redirect::to(&url)))
}

/// Finish Google sign-in
#[utoipa::path(
    get,
    path = "/api/v1/auth/google/callback",
    params(GoogleCallbackQuery),
    responses(
        (status = 200, description = "Identity resolved", body = GoogleAuthResponse),
        (status = 400, description = "Missing or mismatched state", body = ErrorResponse),
        (status = 401, description = "Provider did not verify the email", body = ErrorResponse),
        (status = 502, description = "Google exchange failed", body = ErrorResponse)
    ),
    tag = "OAuth"
)]
#[tracing::instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<(CookieJar, Json<GoogleAuthResponse>), AppError> {
    let exchange = google_exchange(&state)?;

    if let Some(error) = query.error {
        tracing::info!(error = %error, "Google returned an OAuth error");
        return Err(AppError::BadRequest(anyhow::anyhow!("OAuth error: {}", error)));
    }

    let code = query
        .code
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;
    let returned_state = query
        .state
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing state parameter")))?;

    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let verifier = jar.get(VERIFIER_COOKIE).map(|c| c.value().to_string());

    let (Some(expected_state), Some(verifier)) = (expected_state, verifier) else {
        return Err(AppError::BadRequest(anyhow::anyhow!("OAuth session expired")));
    };

    if !bool::from(returned_state.as_bytes().ct_eq(expected_state.as_bytes())) {
        tracing::warn!("OAuth state mismatch");
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid state parameter")));
    }

    let (identity, tokens, is_new_user) = state
        .federated_auth
        .login_with_code(&exchange.provider(), &code, &verifier)
        .await?;

    let jar = jar
        .remove(expired_cookie(STATE_COOKIE))
        .remove(expired_cookie(VERIFIER_COOKIE));

    Ok((
        jar,
        Json(GoogleAuthResponse {
            user: identity.sanitized(),
            tokens,
            is_new_user,
        }),
    ))
}
