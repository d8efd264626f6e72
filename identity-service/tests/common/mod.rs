//! Shared harness for identity-service integration tests.
//!
//! Builds the real router over an in-memory identity store and drives it with
//! `tower::ServiceExt::oneshot`, so no network or database is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        Environment, GoogleOAuthConfig, HashingConfig, IdentityConfig, RateLimitConfig,
        SecurityConfig, TokenConfig,
    },
    services::{IdentityStore, MemoryIdentityStore},
    AppState,
};
use secrecy::SecretString;
use serde_json::Value;
use service_core::config::ServerConfig;
use service_core::observability::LogFormat;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const TEST_FEDERATION_KEY: &str = "test-federation-key-12345";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        server: ServerConfig::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        log_format: LogFormat::Pretty,
        otlp_endpoint: None,
        database: None,
        token: TokenConfig {
            signing_secret: SecretString::new(TEST_SECRET.to_string()),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
        },
        // Cheap parameters keep the suite fast.
        hashing: HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        google: None,
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            federation_api_key: Some(SecretString::new(TEST_FEDERATION_KEY.to_string())),
        },
        rate_limit: RateLimitConfig {
            auth_attempts: 1000,
            auth_window_seconds: 60,
        },
    }
}

pub fn google_config(base_url: &str) -> GoogleOAuthConfig {
    GoogleOAuthConfig {
        client_id: "test-client-id".to_string(),
        client_secret: SecretString::new("test-client-secret".to_string()),
        redirect_uri: "http://localhost:5000/api/v1/auth/google/callback".to_string(),
        auth_url: format!("{}/o/oauth2/v2/auth", base_url),
        token_url: format!("{}/token", base_url),
        userinfo_url: format!("{}/oauth2/v2/userinfo", base_url),
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryIdentityStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: IdentityConfig) -> Self {
        let store = Arc::new(MemoryIdentityStore::new());
        let state = AppState::new(config, store.clone() as Arc<dyn IdentityStore>)
            .expect("Failed to build app state");
        let router = build_router(state.clone());
        Self {
            router,
            state,
            store,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> TestResponse {
        self.send(json_request(Method::POST, uri, body)).await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn get_with_bearer(&self, uri: &str, token: &str) -> TestResponse {
        self.send(
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    /// Register a user and return the `{user, tokens}` body.
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Value {
        let res = self
            .post_json(
                "/api/v1/auth/register",
                serde_json::json!({ "email": email, "password": password, "name": name }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "register failed: {}", res.body);
        res.body
    }
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
