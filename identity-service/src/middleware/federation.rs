use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use subtle::ConstantTimeEq;

use crate::AppState;

pub const FEDERATION_KEY_HEADER: &str = "x-federation-api-key";

/// Guards the trusted identity-assertion endpoint with a shared key.
pub async fn federation_key_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.config.security.federation_api_key.as_ref() else {
        tracing::warn!("Federation endpoint called without a configured key");
        return Err(AppError::Forbidden(anyhow::anyhow!("Federation is disabled")));
    };

    let presented = req
        .headers()
        .get(FEDERATION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !keys_match(presented, expected.expose_secret()) {
        tracing::warn!("Rejected federation request with invalid key");
        return Err(AppError::Unauthorized(anyhow::anyhow!("Invalid federation key")));
    }

    Ok(next.run(req).await)
}

fn keys_match(presented: &str, expected: &str) -> bool {
    !presented.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
