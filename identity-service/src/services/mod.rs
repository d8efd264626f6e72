//! Authentication core: hashing lives in `utils`, everything else here.

mod database;
pub mod error;
mod federated;
mod local;
pub mod oauth;
mod session;
pub mod store;
pub mod token;

pub use database::Database;
pub use error::AuthError;
pub use federated::FederatedAuthService;
pub use local::{EmailStatus, LocalAuthService};
pub use oauth::{FederatedProfile, GoogleOAuthClient, OAuthCodeExchange, OAuthError};
pub use session::{SessionManager, TokenPair};
pub use store::{
    migrate_legacy_provider_tags, IdentityStore, MemoryIdentityStore, StoreError,
    LEGACY_CREDENTIALS_TAG,
};
pub use token::{Claims, TokenCodec, TokenError, TokenKind};
