use std::collections::HashMap;
use std::sync::Arc;

use super::error::AuthError;
use super::oauth::OAuthCodeExchange;
use super::session::{SessionManager, TokenPair};
use super::store::{IdentityStore, StoreError};
use crate::models::{AuthProvider, Identity};
use crate::utils::normalize_email;

/// Sign-in through external identity providers, merged on email.
#[derive(Clone)]
pub struct FederatedAuthService {
    store: Arc<dyn IdentityStore>,
    sessions: SessionManager,
    exchanges: HashMap<AuthProvider, Arc<dyn OAuthCodeExchange>>,
}

impl FederatedAuthService {
    pub fn new(store: Arc<dyn IdentityStore>, sessions: SessionManager) -> Self {
        Self {
            store,
            sessions,
            exchanges: HashMap::new(),
        }
    }

    /// Register the code-exchange client for its provider.
    pub fn with_exchange(mut self, exchange: Arc<dyn OAuthCodeExchange>) -> Self {
        self.exchanges.insert(exchange.provider(), exchange);
        self
    }

    pub fn exchange(&self, provider: &AuthProvider) -> Option<Arc<dyn OAuthCodeExchange>> {
        self.exchanges.get(provider).cloned()
    }

    /// Find the identity for `email` or create one vouched for by `provider`.
    ///
    /// An existing identity is reused whatever it was created with; the
    /// provider is linked as an additional auth method. Returns `true` in the
    /// last position when a new identity was created.
    #[tracing::instrument(skip_all, fields(provider = %provider))]
    pub async fn resolve_or_create(
        &self,
        provider: &AuthProvider,
        email: &str,
        name: &str,
        avatar_url: Option<String>,
    ) -> Result<(Identity, TokenPair, bool), AuthError> {
        let email = normalize_email(email);

        if let Some(existing) = self.store.find_by_email(&email).await? {
            let identity = self.merge(existing, provider).await?;
            let tokens = self.sessions.issue(identity.id)?;
            return Ok((identity, tokens, false));
        }

        let candidate = Identity::new_federated(
            provider.clone(),
            email.clone(),
            name.trim().to_string(),
            avatar_url.filter(|url| !url.trim().is_empty()),
        );

        let (identity, created) = match self.store.create(candidate).await {
            Ok(identity) => {
                tracing::info!(identity_id = %identity.id, "Federated identity created");
                (identity, true)
            }
            Err(StoreError::Conflict) => {
                // Someone created the same email between our read and write.
                let winner = self.store.find_by_email(&email).await?.ok_or_else(|| {
                    AuthError::StoreFailure(anyhow::anyhow!(
                        "Identity vanished after create conflict"
                    ))
                })?;
                (self.merge(winner, provider).await?, false)
            }
            Err(e) => return Err(e.into()),
        };

        let tokens = self.sessions.issue(identity.id)?;
        Ok((identity, tokens, created))
    }

    /// Run the provider's code exchange, then resolve the returned profile.
    pub async fn login_with_code(
        &self,
        provider: &AuthProvider,
        code: &str,
        code_verifier: &str,
    ) -> Result<(Identity, TokenPair, bool), AuthError> {
        let exchange = self
            .exchange(provider)
            .ok_or_else(|| AuthError::UnsupportedProvider(provider.to_string()))?;

        let profile = exchange.exchange_code(code, code_verifier).await?;
        tracing::debug!(provider_user_id = %profile.provider_user_id, "Provider returned profile");

        self.resolve_or_create(provider, &profile.email, &profile.name, profile.avatar_url)
            .await
    }

    async fn merge(&self, mut identity: Identity, provider: &AuthProvider) -> Result<Identity, AuthError> {
        if !identity.has_auth_method(provider) {
            self.store.link_auth_method(identity.id, provider).await?;
            identity.auth_methods.insert(provider.clone());
            tracing::info!(identity_id = %identity.id, "Linked provider to existing identity");
        }
        Ok(identity)
    }
}
