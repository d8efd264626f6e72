pub mod auth;
pub mod federation;

pub use auth::{auth_middleware, AuthUser};
pub use federation::{federation_key_middleware, FEDERATION_KEY_HEADER};
