//! Identity model - one row per email address, reachable through one or more auth methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::PasswordHashString;

/// How an identity authenticates.
///
/// `Credentials` is email + password; anything else is the lower-cased name of
/// a federated provider (`google`, `github`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuthProvider {
    Credentials,
    Federated(String),
}

impl AuthProvider {
    pub const CREDENTIALS: &'static str = "credentials";

    pub fn federated(name: &str) -> Self {
        Self::from(name)
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthProvider::Credentials => Self::CREDENTIALS,
            AuthProvider::Federated(name) => name,
        }
    }

    pub fn is_credentials(&self) -> bool {
        matches!(self, AuthProvider::Credentials)
    }
}

impl From<&str> for AuthProvider {
    fn from(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        if normalized == Self::CREDENTIALS {
            AuthProvider::Credentials
        } else {
            AuthProvider::Federated(normalized)
        }
    }
}

impl From<String> for AuthProvider {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<AuthProvider> for String {
    fn from(value: AuthProvider) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity entity.
///
/// `provider` records how the identity was first created and never changes on
/// merge; `auth_methods` is every method currently linked to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub credential_secret: Option<PasswordHashString>,
    pub provider: AuthProvider,
    pub auth_methods: BTreeSet<AuthProvider>,
    pub verified: bool,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Identity {
    /// New password-based identity. Starts unverified.
    pub fn new_local(email: String, credential_secret: PasswordHashString, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            credential_secret: Some(credential_secret),
            provider: AuthProvider::Credentials,
            auth_methods: BTreeSet::from([AuthProvider::Credentials]),
            verified: false,
            display_name,
            avatar_url: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// New identity vouched for by a federated provider. The provider already
    /// verified the email, so the identity starts verified and has no secret.
    pub fn new_federated(
        provider: AuthProvider,
        email: String,
        display_name: String,
        avatar_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            credential_secret: None,
            auth_methods: BTreeSet::from([provider.clone()]),
            provider,
            verified: true,
            display_name,
            avatar_url,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn has_auth_method(&self, method: &AuthProvider) -> bool {
        self.auth_methods.contains(method)
    }

    /// Convert to sanitized response (no credential secret).
    pub fn sanitized(&self) -> IdentityResponse {
        IdentityResponse::from(self)
    }
}

/// Identity as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IdentityResponse {
    pub id: Uuid,
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub name: String,
    pub avatar_url: Option<String>,
    #[schema(example = "credentials")]
    pub provider: String,
    #[schema(example = json!(["credentials", "google"]))]
    pub auth_methods: Vec<String>,
    pub verified: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<&Identity> for IdentityResponse {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            email: identity.email.clone(),
            name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            provider: identity.provider.to_string(),
            auth_methods: identity
                .auth_methods
                .iter()
                .map(|m| m.to_string())
                .collect(),
            verified: identity.verified,
            created_utc: identity.created_utc,
        }
    }
}
