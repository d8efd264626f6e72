//! OAuth authorization-code exchange with external identity providers.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;
use crate::models::AuthProvider;

/// Identity attributes vouched for by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FederatedProfile {
    pub provider_user_id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("Token exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("User info unavailable: {0}")]
    UserInfoUnavailable(String),

    #[error("Email not verified with provider")]
    EmailNotVerified,
}

/// Turns an authorization code into a verified profile.
#[async_trait]
pub trait OAuthCodeExchange: Send + Sync {
    fn provider(&self) -> AuthProvider;

    /// Where to send the browser, carrying `state` and the PKCE challenge.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> String;

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<FederatedProfile, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

#[derive(Clone)]
pub struct GoogleOAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: &GoogleOAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            userinfo_url: config.userinfo_url.clone(),
        }
    }

    async fn fetch_access_token(&self, code: &str, code_verifier: &str) -> Result<String, OAuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
                ("code_verifier", code_verifier),
            ])
            .send()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(format!("Failed to contact Google: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), error = %error_text, "Google token exchange failed");
            return Err(OAuthError::ExchangeFailed(format!(
                "Google returned {}",
                status
            )));
        }

        let tokens = response
            .json::<GoogleTokenResponse>()
            .await
            .map_err(|e| OAuthError::ExchangeFailed(format!("Failed to parse Google response: {}", e)))?;

        Ok(tokens.access_token)
    }

    async fn fetch_user_info(&self, access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
        let response = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthError::UserInfoUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Google userinfo request failed");
            return Err(OAuthError::UserInfoUnavailable(format!(
                "Google returned {}",
                status
            )));
        }

        response
            .json::<GoogleUserInfo>()
            .await
            .map_err(|e| OAuthError::UserInfoUnavailable(e.to_string()))
    }
}

#[async_trait]
impl OAuthCodeExchange for GoogleOAuthClient {
    fn provider(&self) -> AuthProvider {
        AuthProvider::federated("google")
    }

    fn authorization_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256&prompt=select_account",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    #[tracing::instrument(skip_all, fields(provider = "google"))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<FederatedProfile, OAuthError> {
        let access_token = self.fetch_access_token(code, code_verifier).await?;
        let info = self.fetch_user_info(&access_token).await?;

        if !info.verified_email {
            tracing::info!("Google account email is not verified");
            return Err(OAuthError::EmailNotVerified);
        }

        Ok(FederatedProfile {
            provider_user_id: info.id,
            name: info.name.unwrap_or_else(|| info.email.clone()),
            email: info.email,
            avatar_url: info.picture,
        })
    }
}
