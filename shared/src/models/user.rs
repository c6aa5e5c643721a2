//! User accounts and role profiles

use serde::{Deserialize, Serialize};

/// Marketplace role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Client,
    Deliverer,
    Merchant,
    Provider,
    Admin,
}

db_enum!(UserRole {
    Client => "CLIENT",
    Deliverer => "DELIVERER",
    Merchant => "MERCHANT",
    Provider => "PROVIDER",
    Admin => "ADMIN",
});

impl UserRole {
    /// Admin accounts are provisioned, never self-registered
    pub fn is_self_registrable(&self) -> bool {
        !matches!(self, Self::Admin)
    }

    /// Clients are usable immediately, other roles wait for document checks
    pub fn initial_status(&self) -> UserStatus {
        match self {
            Self::Client | Self::Admin => UserStatus::Active,
            Self::Deliverer | Self::Merchant | Self::Provider => UserStatus::PendingVerification,
        }
    }

    /// Roles allowed to publish delivery announcements
    pub fn can_publish_announcements(&self) -> bool {
        matches!(self, Self::Client | Self::Merchant)
    }
}

/// Account lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Registered, documents not yet approved
    PendingVerification,
    Active,
    /// Blocked by an admin
    Suspended,
    Inactive,
}

db_enum!(UserStatus {
    PendingVerification => "PENDING_VERIFICATION",
    Active => "ACTIVE",
    Suspended => "SUSPENDED",
    Inactive => "INACTIVE",
});

impl UserStatus {
    /// Pending users may log in to upload their documents
    pub fn can_login(&self) -> bool {
        matches!(self, Self::PendingVerification | Self::Active)
    }
}

/// User row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub status: String,
    pub is_verified: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl User {
    pub fn role(&self) -> Option<UserRole> {
        UserRole::from_db(&self.role)
    }

    pub fn status(&self) -> Option<UserStatus> {
        UserStatus::from_db(&self.status)
    }
}

/// Deliverer vehicle and preferences
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DelivererProfile {
    pub user_id: i64,
    pub vehicle_type: String,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    pub careful_handling: bool,
    pub refrigerated: bool,
    pub accepts_negotiation: bool,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: String,
    pub status: String,
    pub is_verified: bool,
}

impl From<&User> for UserInfo {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            role: u.role.clone(),
            status: u.status.clone(),
            is_verified: u.is_verified,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DelivererProfileUpdate {
    pub vehicle_type: String,
    pub max_weight_kg: f64,
    pub max_volume_m3: f64,
    #[serde(default)]
    pub careful_handling: bool,
    #[serde(default)]
    pub refrigerated: bool,
    #[serde(default)]
    pub accepts_negotiation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserStatusRequest {
    pub status: UserStatus,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_db_roundtrip() {
        for role in UserRole::ALL {
            assert_eq!(UserRole::from_db(role.as_db()), Some(*role));
        }
        assert_eq!(UserRole::from_db("client"), None);
    }

    #[test]
    fn test_initial_status() {
        assert_eq!(UserRole::Client.initial_status(), UserStatus::Active);
        assert_eq!(
            UserRole::Deliverer.initial_status(),
            UserStatus::PendingVerification
        );
        assert_eq!(
            UserRole::Provider.initial_status(),
            UserStatus::PendingVerification
        );
    }

    #[test]
    fn test_admin_not_registrable() {
        assert!(!UserRole::Admin.is_self_registrable());
        assert!(UserRole::Merchant.is_self_registrable());
    }

    #[test]
    fn test_can_login() {
        assert!(UserStatus::Active.can_login());
        assert!(UserStatus::PendingVerification.can_login());
        assert!(!UserStatus::Suspended.can_login());
        assert!(!UserStatus::Inactive.can_login());
    }

    #[test]
    fn test_serde_matches_db() {
        let json = serde_json::to_string(&UserStatus::PendingVerification).unwrap();
        assert_eq!(json, format!("\"{}\"", UserStatus::PendingVerification.as_db()));
    }
}
