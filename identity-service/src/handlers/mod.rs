//! HTTP handlers.

pub mod auth;
pub mod health;
pub mod oauth;

pub use auth::{check_email, login, me, oauth_sign_in, refresh, register};
pub use health::health_check;
pub use oauth::{google_callback, google_login};
