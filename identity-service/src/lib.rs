pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::config::IdentityConfig;
use crate::middleware::FEDERATION_KEY_HEADER;
use crate::services::{
    FederatedAuthService, GoogleOAuthClient, IdentityStore, LocalAuthService, SessionManager,
};
use crate::utils::CredentialHasher;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::check_email,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::oauth_sign_in,
        handlers::auth::me,
        handlers::oauth::google_login,
        handlers::oauth::google_callback,
    ),
    components(
        schemas(
            dtos::RegisterRequest,
            dtos::LoginRequest,
            dtos::RefreshRequest,
            dtos::CheckEmailRequest,
            dtos::CheckEmailResponse,
            dtos::OAuthRequest,
            dtos::AuthResponse,
            dtos::GoogleAuthResponse,
            dtos::ErrorResponse,
            services::TokenPair,
            models::IdentityResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and token management"),
        (name = "OAuth", description = "Sign-in through external identity providers"),
        (name = "Observability", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
            components.add_security_scheme(
                "federation_api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(FEDERATION_KEY_HEADER))),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdentityConfig>,
    pub store: Arc<dyn IdentityStore>,
    pub sessions: SessionManager,
    pub local_auth: LocalAuthService,
    pub federated_auth: FederatedAuthService,
    pub auth_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the services on top of `store`. Google sign-in is registered only
    /// when it is configured.
    pub fn new(config: IdentityConfig, store: Arc<dyn IdentityStore>) -> Result<Self, AppError> {
        let hasher = CredentialHasher::new(&config.hashing).map_err(AppError::ConfigError)?;
        let sessions = SessionManager::from_config(&config.token)
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let local_auth = LocalAuthService::new(store.clone(), hasher, sessions.clone());

        let mut federated_auth = FederatedAuthService::new(store.clone(), sessions.clone());
        if let Some(google) = config.google.as_ref() {
            federated_auth = federated_auth.with_exchange(Arc::new(GoogleOAuthClient::new(google)));
            tracing::info!("Google sign-in enabled");
        }

        let auth_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.auth_attempts,
            config.rate_limit.auth_window_seconds,
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            sessions,
            local_auth,
            federated_auth,
            auth_rate_limiter,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let mut auth_routes = Router::new()
        .route("/check-email", post(handlers::check_email))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/refresh", post(handlers::refresh));

    if state.config.security.federation_api_key.is_some() {
        auth_routes = auth_routes.merge(
            Router::new()
                .route("/oauth", post(handlers::oauth_sign_in))
                .layer(from_fn_with_state(
                    state.clone(),
                    middleware::federation_key_middleware,
                )),
        );
    }

    if state.config.google.is_some() {
        auth_routes = auth_routes
            .route("/google", get(handlers::google_login))
            .route("/google/callback", get(handlers::google_callback));
    }

    let auth_routes = auth_routes.layer(from_fn_with_state(
        state.auth_rate_limiter.clone(),
        ip_rate_limit_middleware,
    ));

    let session_routes = Router::new()
        .route("/me", get(handlers::me))
        .layer(from_fn_with_state(state.clone(), middleware::auth_middleware));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .nest("/api/v1/auth", auth_routes.merge(session_routes))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins))
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(FEDERATION_KEY_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    // Dev only; rejected by config validation in prod.
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(AllowOrigin::any());
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    layer.allow_origin(origins)
}
