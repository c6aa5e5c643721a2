//! Shared types for EcoDeli
//!
//! Domain models, the error system and the pure business rules (geo,
//! routing, matching, pricing) used by the HTTP service.

pub mod error;
pub mod geo;
pub mod matching;
pub mod models;
pub mod pricing;
pub mod routing;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{AppError, ErrorBody, ErrorCode};
