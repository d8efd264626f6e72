use std::sync::Arc;
use validator::Validate;

use super::error::AuthError;
use super::session::{SessionManager, TokenPair};
use super::store::{IdentityStore, StoreError};
use crate::dtos::RegisterRequest;
use crate::models::{AuthProvider, Identity};
use crate::utils::{normalize_email, CredentialHasher, Password};

/// Result of an email lookup: whether it is taken and how it signs in.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailStatus {
    pub exists: bool,
    pub provider: Option<AuthProvider>,
}

/// Email + password registration and login.
#[derive(Clone)]
pub struct LocalAuthService {
    store: Arc<dyn IdentityStore>,
    hasher: CredentialHasher,
    sessions: SessionManager,
}

impl LocalAuthService {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        hasher: CredentialHasher,
        sessions: SessionManager,
    ) -> Self {
        Self {
            store,
            hasher,
            sessions,
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn register(&self, req: RegisterRequest) -> Result<(Identity, TokenPair), AuthError> {
        let req = req.normalized();
        req.validate()?;

        if self.store.find_by_email(&req.email).await?.is_some() {
            tracing::info!("Registration rejected: email already registered");
            return Err(AuthError::AlreadyExists);
        }

        let password_hash = self
            .hasher
            .hash(&Password::new(req.password))
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let identity = self
            .store
            .create(Identity::new_local(req.email, password_hash, req.name))
            .await
            .map_err(|e| match e {
                StoreError::Conflict => {
                    tracing::info!("Registration lost a race on email");
                    AuthError::AlreadyExists
                }
                other => other.into(),
            })?;

        let tokens = self.sessions.issue(identity.id)?;
        tracing::info!(identity_id = %identity.id, "Identity registered");

        Ok((identity, tokens))
    }

    /// Check an email/password pair. Every failure is the same `InvalidCredentials`.
    #[tracing::instrument(skip_all)]
    pub async fn authenticate(
        &self,
        email: &str,
        password: &Password,
    ) -> Result<(Identity, TokenPair), AuthError> {
        let email = normalize_email(email);

        let Some(identity) = self.store.find_by_email(&email).await? else {
            self.hasher.verify_missing(password);
            tracing::debug!("Login failed: unknown email");
            return Err(AuthError::InvalidCredentials);
        };

        let Some(secret) = identity.credential_secret.as_ref() else {
            self.hasher.verify_missing(password);
            tracing::debug!(identity_id = %identity.id, "Login failed: identity has no password");
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, secret) {
            tracing::debug!(identity_id = %identity.id, "Login failed: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let tokens = self.sessions.issue(identity.id)?;
        tracing::info!(identity_id = %identity.id, "Identity authenticated");

        Ok((identity, tokens))
    }

    /// Report whether `email` is registered and with which provider.
    pub async fn check_email(&self, email: &str) -> Result<EmailStatus, AuthError> {
        let email = normalize_email(email);
        let status = match self.store.find_by_email(&email).await? {
            Some(identity) => EmailStatus {
                exists: true,
                provider: Some(identity.provider),
            },
            None => EmailStatus {
                exists: false,
                provider: None,
            },
        };
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashingConfig;
    use crate::services::store::testing::{FailingStore, LateWriterStore};
    use crate::services::store::MemoryIdentityStore;
    use crate::services::token::TokenCodec;
    use chrono::Duration;
    use secrecy::SecretString;

    fn service_over(store: Arc<dyn IdentityStore>) -> (LocalAuthService, SessionManager) {
        let hasher = CredentialHasher::new(&HashingConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        })
        .unwrap();
        let codec = TokenCodec::new(&SecretString::new("local-test-secret".to_string())).unwrap();
        let sessions = SessionManager::new(codec, Duration::minutes(15), Duration::days(7));
        (LocalAuthService::new(store, hasher, sessions.clone()), sessions)
    }

    fn service() -> (LocalAuthService, Arc<MemoryIdentityStore>, SessionManager) {
        let store = Arc::new(MemoryIdentityStore::new());
        let (service, sessions) = service_over(store.clone());
        (service, store, sessions)
    }

    fn register_req(email: &str, password: &str, name: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_creates_unverified_credentials_identity() {
        let (service, _, sessions) = service();

        let (identity, tokens) = service
            .register(register_req("a@x.com", "password123", "A"))
            .await
            .unwrap();

        assert_eq!(identity.provider, AuthProvider::Credentials);
        assert!(identity.has_auth_method(&AuthProvider::Credentials));
        assert!(!identity.verified);
        assert!(identity.credential_secret.is_some());
        assert_eq!(sessions.validate(&tokens.access_token).unwrap().sub, identity.id);
    }

    #[tokio::test]
    async fn test_register_normalizes_email() {
        let (service, store, _) = service();

        service
            .register(register_req("  A@X.com ", "password123", "A"))
            .await
            .unwrap();

        assert!(store.find_by_email("a@x.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let (service, _, _) = service();
        service
            .register(register_req("a@x.com", "password123", "A"))
            .await
            .unwrap();

        let result = service
            .register(register_req("A@x.com", "different123", "B"))
            .await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));
    }

    #[tokio::test]
    async fn test_invalid_registration_touches_nothing() {
        let (service, store, _) = service();

        let err = service
            .register(register_req("bad-email", "short", ""))
            .await
            .unwrap_err();

        let AuthError::ValidationFailed(errors) = err else {
            panic!("expected validation failure, got {:?}", err);
        };
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|k| k.to_string())
            .collect();
        fields.sort();
        assert_eq!(fields, vec!["email", "name", "password"]);
        assert!(store.find_by_email("bad-email").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate() {
        let (service, _, sessions) = service();
        let (registered, _) = service
            .register(register_req("a@x.com", "password123", "A"))
            .await
            .unwrap();

        let (identity, tokens) = service
            .authenticate("A@X.COM", &Password::new("password123".to_string()))
            .await
            .unwrap();

        assert_eq!(identity.id, registered.id);
        assert_eq!(sessions.validate(&tokens.access_token).unwrap().sub, registered.id);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_identical() {
        let (service, _, _) = service();
        service
            .register(register_req("a@x.com", "password123", "A"))
            .await
            .unwrap();

        let wrong = service
            .authenticate("a@x.com", &Password::new("wrong-password".to_string()))
            .await
            .unwrap_err();
        let unknown = service
            .authenticate("nobody@x.com", &Password::new("password123".to_string()))
            .await
            .unwrap_err();

        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test]
    async fn test_federated_identity_cannot_password_login() {
        let (service, store, _) = service();
        store
            .create(Identity::new_federated(
                AuthProvider::federated("google"),
                "g@x.com".to_string(),
                "G".to_string(),
                None,
            ))
            .await
            .unwrap();

        let result = service
            .authenticate("g@x.com", &Password::new("anything123".to_string()))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_check_email() {
        let (service, _, _) = service();
        service
            .register(register_req("a@x.com", "password123", "A"))
            .await
            .unwrap();

        assert_eq!(
            service.check_email(" A@x.com").await.unwrap(),
            EmailStatus {
                exists: true,
                provider: Some(AuthProvider::Credentials),
            }
        );
        assert_eq!(
            service.check_email("b@x.com").await.unwrap(),
            EmailStatus {
                exists: false,
                provider: None,
            }
        );
    }

    #[tokio::test]
    async fn test_store_outage_is_not_reported_as_bad_credentials() {
        let (service, _) = service_over(Arc::new(FailingStore));

        let login = service
            .authenticate("a@x.com", &Password::new("password123".to_string()))
            .await;
        assert!(matches!(login, Err(AuthError::StoreFailure(_))));

        let register = service
            .register(register_req("a@x.com", "password123", "A"))
            .await;
        assert!(matches!(register, Err(AuthError::StoreFailure(_))));

        let check = service.check_email("a@x.com").await;
        assert!(matches!(check, Err(AuthError::StoreFailure(_))));
    }

    #[tokio::test]
    async fn test_register_losing_create_race_is_already_exists() {
        let store = Arc::new(LateWriterStore::default());
        let (service, _) = service_over(store.clone());
        let winner = store
            .inner
            .create(Identity::new_federated(
                AuthProvider::federated("google"),
                "a@x.com".to_string(),
                "Winner".to_string(),
                None,
            ))
            .await
            .unwrap();

        let result = service
            .register(register_req("a@x.com", "password123", "A"))
            .await;
        assert!(matches!(result, Err(AuthError::AlreadyExists)));

        let stored = store.inner.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(stored.id, winner.id);
        assert!(stored.credential_secret.is_none());
    }
}
