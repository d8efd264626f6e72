//! PostgreSQL identity store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use super::store::{IdentityStore, StoreError};
use crate::models::{AuthProvider, Identity};
use crate::utils::PasswordHashString;

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct IdentityRow {
    identity_id: Uuid,
    email: String,
    credential_secret: Option<String>,
    provider_code: String,
    auth_methods: Vec<String>,
    verified: bool,
    display_name: String,
    avatar_url: Option<String>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        let provider = AuthProvider::from(row.provider_code);
        let mut auth_methods: std::collections::BTreeSet<AuthProvider> =
            row.auth_methods.into_iter().map(AuthProvider::from).collect();
        // Rows written before auth methods existed only carry the tag.
        if auth_methods.is_empty() {
            auth_methods.insert(provider.clone());
        }

        Identity {
            id: row.identity_id,
            email: row.email,
            credential_secret: row.credential_secret.map(PasswordHashString::new),
            provider,
            auth_methods,
            verified: row.verified,
            display_name: row.display_name,
            avatar_url: row.avatar_url,
            created_utc: row.created_utc,
            updated_utc: row.updated_utc,
        }
    }
}

const SELECT_IDENTITY: &str = r#"
    SELECT identity_id, email, credential_secret, provider_code, auth_methods,
           verified, display_name, avatar_url, created_utc, updated_utc
    FROM identities
"#;

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(anyhow::anyhow!(e))
}

impl Database {
    /// Create a new database wrapper from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn execute_update(&self, sql: &str, id: Uuid, value: &str) -> Result<(), StoreError> {
        let result = sqlx::query(sql)
            .bind(id)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "Identity {} not found",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        let sql = format!("{} WHERE email = $1", SELECT_IDENTITY);
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(Identity::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let sql = format!("{} WHERE identity_id = $1", SELECT_IDENTITY);
        let row = sqlx::query_as::<_, IdentityRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(Identity::from))
    }

    async fn create(&self, identity: Identity) -> Result<Identity, StoreError> {
        let auth_methods: Vec<String> = identity
            .auth_methods
            .iter()
            .map(|m| m.to_string())
            .collect();

        sqlx::query(
            r#"
            INSERT INTO identities (identity_id, email, credential_secret, provider_code, auth_methods,
                                    verified, display_name, avatar_url, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(identity.id)
        .bind(&identity.email)
        .bind(identity.credential_secret.as_ref().map(|s| s.as_str()))
        .bind(identity.provider.as_str())
        .bind(&auth_methods)
        .bind(identity.verified)
        .bind(&identity.display_name)
        .bind(&identity.avatar_url)
        .bind(identity.created_utc)
        .bind(identity.updated_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict,
            other => backend(other),
        })?;

        Ok(identity)
    }

    async fn find_ids_by_provider(&self, provider: &AuthProvider) -> Result<Vec<Uuid>, StoreError> {
        sqlx::query_scalar::<_, Uuid>("SELECT identity_id FROM identities WHERE provider_code = $1")
            .bind(provider.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)
    }

    async fn update_provider(&self, id: Uuid, provider: &AuthProvider) -> Result<(), StoreError> {
        // Right-hand sides see the row's old provider_code.
        self.execute_update(
            r#"
            UPDATE identities
            SET provider_code = $2,
                auth_methods = array_append(
                    array_remove(array_remove(auth_methods, provider_code), $2), $2),
                updated_utc = NOW()
            WHERE identity_id = $1
            "#,
            id,
            provider.as_str(),
        )
        .await
    }

    async fn link_auth_method(&self, id: Uuid, method: &AuthProvider) -> Result<(), StoreError> {
        self.execute_update(
            r#"
            UPDATE identities
            SET auth_methods = CASE WHEN $2 = ANY(auth_methods) THEN auth_methods
                                    ELSE array_append(auth_methods, $2) END,
                updated_utc = NOW()
            WHERE identity_id = $1
            "#,
            id,
            method.as_str(),
        )
        .await
    }

    /// Health check - ping the database.
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::db::health_check(&self.pool).await.map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            backend(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::services::store::{migrate_legacy_provider_tags, LEGACY_CREDENTIALS_TAG};
    use secrecy::SecretString;

    async fn database() -> Database {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/identity_test".to_string());
        let pool = crate::db::create_pool(&DatabaseConfig {
            url: SecretString::new(url),
            max_connections: 2,
            min_connections: 1,
        })
        .await
        .expect("database available");
        crate::db::run_migrations(&pool).await.expect("migrations");
        Database::new(pool)
    }

    fn unique_email() -> String {
        format!("{}@example.com", Uuid::new_v4())
    }

    #[test]
    fn test_row_without_auth_methods_falls_back_to_tag() {
        let now = Utc::now();
        let identity = Identity::from(IdentityRow {
            identity_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            credential_secret: None,
            provider_code: "google".to_string(),
            auth_methods: vec![],
            verified: true,
            display_name: "A".to_string(),
            avatar_url: None,
            created_utc: now,
            updated_utc: now,
        });

        assert_eq!(identity.provider, AuthProvider::federated("google"));
        assert!(identity.has_auth_method(&AuthProvider::federated("google")));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_create_find_and_conflict() {
        let db = database().await;
        let email = unique_email();
        let identity = Identity::new_local(
            email.clone(),
            PasswordHashString::new("$argon2id$stub".to_string()),
            "Test".to_string(),
        );

        let created = db.create(identity.clone()).await.unwrap();
        let found = db.find_by_email(&email).await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert!(found.credential_secret.is_some());

        let mut duplicate = identity;
        duplicate.id = Uuid::new_v4();
        assert!(matches!(db.create(duplicate).await, Err(StoreError::Conflict)));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_legacy_tag_migration() {
        let db = database().await;
        let mut identity = Identity::new_local(
            unique_email(),
            PasswordHashString::new("$argon2id$stub".to_string()),
            "Legacy".to_string(),
        );
        let legacy = AuthProvider::federated(LEGACY_CREDENTIALS_TAG);
        identity.provider = legacy.clone();
        identity.auth_methods = [legacy].into();
        let created = db.create(identity).await.unwrap();

        assert!(migrate_legacy_provider_tags(&db).await.unwrap() >= 1);

        let found = db.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.provider, AuthProvider::Credentials);
        assert_eq!(found.auth_methods.len(), 1);
        assert!(found.has_auth_method(&AuthProvider::Credentials));
    }

    #[tokio::test]
    #[ignore] // Requires running PostgreSQL
    async fn test_link_auth_method_is_idempotent() {
        let db = database().await;
        let identity = Identity::new_local(
            unique_email(),
            PasswordHashString::new("$argon2id$stub".to_string()),
            "Test".to_string(),
        );
        let created = db.create(identity).await.unwrap();
        let google = AuthProvider::federated("google");

        db.link_auth_method(created.id, &google).await.unwrap();
        db.link_auth_method(created.id, &google).await.unwrap();

        let found = db.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.auth_methods.len(), 2);
        assert_eq!(found.provider, AuthProvider::Credentials);
    }
}
