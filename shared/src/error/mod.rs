//! Unified error system for EcoDeli
//!
//! - [`ErrorCode`]: numeric codes grouped by domain
//! - [`ErrorCategory`]: the domain a code belongs to
//! - [`AppError`]: code, message and optional details
//! - [`ErrorBody`]: what an `AppError` looks like on the wire
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorBody, ErrorCode};
//!
//! let err = AppError::validation("Missing required field")
//!     .with_detail("field", "pickup_address");
//!
//! let body = ErrorBody::from(&err);
//! assert_eq!(body.code, ErrorCode::ValidationFailed.code());
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, ErrorBody};
