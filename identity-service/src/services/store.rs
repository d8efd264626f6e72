use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AuthProvider, Identity};

#[derive(Debug, Error)]
pub enum StoreError {
    /// An identity with the same email already exists.
    #[error("Identity already exists")]
    Conflict,

    #[error("Identity store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Persistence for identities. Emails are passed in already normalized.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;
    /// Insert a new identity; `Conflict` if the email is taken.
    async fn create(&self, identity: Identity) -> Result<Identity, StoreError>;
    /// Ids of identities whose creation tag is `provider`.
    async fn find_ids_by_provider(&self, provider: &AuthProvider) -> Result<Vec<Uuid>, StoreError>;
    /// Re-tag an identity. The old tag is unlinked and the new one linked.
    async fn update_provider(&self, id: Uuid, provider: &AuthProvider) -> Result<(), StoreError>;
    /// Add `method` to the identity's auth methods. Linking twice is a no-op.
    async fn link_auth_method(&self, id: Uuid, method: &AuthProvider) -> Result<(), StoreError>;
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Tag written by older releases for password accounts.
pub const LEGACY_CREDENTIALS_TAG: &str = "email";

/// Re-tag identities still carrying the legacy password tag as `credentials`.
/// Returns how many were migrated.
pub async fn migrate_legacy_provider_tags(store: &dyn IdentityStore) -> Result<usize, StoreError> {
    let legacy = AuthProvider::federated(LEGACY_CREDENTIALS_TAG);
    let ids = store.find_ids_by_provider(&legacy).await?;

    for id in &ids {
        store.update_provider(*id, &AuthProvider::Credentials).await?;
    }

    if !ids.is_empty() {
        tracing::info!(
            count = ids.len(),
            "Migrated identities from provider '{}' to '{}'",
            LEGACY_CREDENTIALS_TAG,
            AuthProvider::CREDENTIALS
        );
    }
    Ok(ids.len())
}

/// In-process store keyed by id with an email index.
#[derive(Default)]
pub struct MemoryIdentityStore {
    inner: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    by_id: HashMap<Uuid, Identity>,
    id_by_email: HashMap<String, Uuid>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Identity store mutex poisoned: {}", e)))
    }

    fn with_identity<F>(&self, id: Uuid, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Identity),
    {
        let mut state = self.lock()?;
        let identity = state
            .by_id
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("Identity {} not found", id)))?;
        f(identity);
        identity.updated_utc = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .id_by_email
            .get(email)
            .and_then(|id| state.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.by_id.get(&id).cloned())
    }

    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        let mut state = self.lock()?;
        if state.id_by_email.contains_key(&identity.email) || state.by_id.contains_key(&identity.id) {
            return Err(StoreError::Conflict);
        }

        state.id_by_email.insert(identity.email.clone(), identity.id);
        state.by_id.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn find_ids_by_provider(&self, provider: &AuthProvider) -> Result<Vec<Uuid>, StoreError> {
        Ok(self
            .lock()?
            .by_id
            .values()
            .filter(|identity| &identity.provider == provider)
            .map(|identity| identity.id)
            .collect())
    }

    async fn update_provider(&self, id: Uuid, provider: &AuthProvider) -> Result<(), StoreError> {
        self.with_identity(id, |identity| {
            identity.auth_methods.remove(&identity.provider);
            identity.provider = provider.clone();
            identity.auth_methods.insert(provider.clone());
        })
    }

    async fn link_auth_method(&self, id: Uuid, method: &AuthProvider) -> Result<(), StoreError> {
        self.with_identity(id, |identity| {
            identity.auth_methods.insert(method.clone());
        })
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PasswordHashString;
    use std::collections::BTreeSet;

    fn local(email: &str) -> Identity {
        Identity::new_local(
            email.to_string(),
            PasswordHashString::new("$argon2id$stub".to_string()),
            "Test".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryIdentityStore::new();
        let created = store.create(local("a@x.com")).await.unwrap();

        let by_email = store.find_by_email("a@x.com").await.unwrap().unwrap();
        let by_id = store.find_by_id(created.id).await.unwrap().unwrap();

        assert_eq!(by_email, created);
        assert_eq!(by_id, created);
        assert!(store.find_by_email("b@x.com").await.unwrap().is_none());
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = MemoryIdentityStore::new();
        store.create(local("a@x.com")).await.unwrap();

        let result = store.create(local("a@x.com")).await;
        assert!(matches!(result, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    async fn test_link_auth_method_is_idempotent() {
        let store = MemoryIdentityStore::new();
        let created = store.create(local("a@x.com")).await.unwrap();
        let google = AuthProvider::federated("google");

        store.link_auth_method(created.id, &google).await.unwrap();
        store.link_auth_method(created.id, &google).await.unwrap();

        let identity = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(identity.auth_methods.len(), 2);
        assert_eq!(identity.provider, AuthProvider::Credentials);
    }

    #[tokio::test]
    async fn test_update_provider_replaces_tag() {
        let store = MemoryIdentityStore::new();
        let created = store.create(local("a@x.com")).await.unwrap();
        let google = AuthProvider::federated("google");

        store.update_provider(created.id, &google).await.unwrap();

        let identity = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(identity.provider, google);
        assert!(identity.has_auth_method(&google));
        assert!(!identity.has_auth_method(&AuthProvider::Credentials));
    }

    #[tokio::test]
    async fn test_legacy_email_tag_migrates_to_credentials() {
        let store = MemoryIdentityStore::new();
        let legacy = AuthProvider::federated(LEGACY_CREDENTIALS_TAG);

        let mut old = local("old@x.com");
        old.provider = legacy.clone();
        old.auth_methods = [legacy.clone()].into();
        let old = store.create(old).await.unwrap();
        let current = store.create(local("new@x.com")).await.unwrap();
        store
            .create(Identity::new_federated(
                AuthProvider::federated("google"),
                "g@x.com".to_string(),
                "G".to_string(),
                None,
            ))
            .await
            .unwrap();

        assert_eq!(migrate_legacy_provider_tags(&store).await.unwrap(), 1);

        let migrated = store.find_by_id(old.id).await.unwrap().unwrap();
        assert_eq!(migrated.provider, AuthProvider::Credentials);
        assert_eq!(
            migrated.auth_methods,
            BTreeSet::from([AuthProvider::Credentials])
        );
        assert_eq!(store.find_by_id(current.id).await.unwrap().unwrap(), current);

        // Nothing left to migrate on the next start.
        assert_eq!(migrate_legacy_provider_tags(&store).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_updating_unknown_identity_fails() {
        let store = MemoryIdentityStore::new();
        let result = store
            .link_auth_method(Uuid::new_v4(), &AuthProvider::Credentials)
            .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }
}
