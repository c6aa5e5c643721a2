//! Authentication and authorization middleware

pub mod rate_limit;
pub mod user_auth;

pub use user_auth::{CurrentUser, require_auth, require_role};
