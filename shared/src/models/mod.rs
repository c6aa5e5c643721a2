//! Domain models
//!
//! Row structs mirror the PostgreSQL tables and keep enum columns as TEXT;
//! the enums below convert with `as_db()` / `from_db()`.

/// Implement `as_db`, `from_db`, `ALL` and `Display` for a unit enum
/// stored as TEXT.
macro_rules! db_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Database string representation
            pub const fn as_db(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Parse from database string value
            pub fn from_db(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_db())
            }
        }
    };
}

pub mod announcement;
pub mod delivery;
pub mod document;
pub mod notification;
pub mod payment;
pub mod review;
pub mod route;
pub mod service;
pub mod storage;
pub mod user;
pub mod wallet;

pub use announcement::*;
pub use delivery::*;
pub use document::*;
pub use notification::*;
pub use payment::*;
pub use review::*;
pub use route::*;
pub use service::*;
pub use storage::*;
pub use user::*;
pub use wallet::*;
