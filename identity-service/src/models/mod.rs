pub mod identity;

pub use identity::{AuthProvider, Identity, IdentityResponse};
