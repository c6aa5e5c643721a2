//! In-app notifications

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    DeliveryAssigned,
    DeliveryStatus,
    PaymentReleased,
    PaymentRefunded,
    WithdrawalUpdate,
    DocumentReviewed,
    AccountVerified,
    BookingUpdate,
    ReservationUpdate,
    ApplicationReceived,
}

db_enum!(NotificationKind {
    DeliveryAssigned => "DELIVERY_ASSIGNED",
    DeliveryStatus => "DELIVERY_STATUS",
    PaymentReleased => "PAYMENT_RELEASED",
    PaymentRefunded => "PAYMENT_REFUNDED",
    WithdrawalUpdate => "WITHDRAWAL_UPDATE",
    DocumentReviewed => "DOCUMENT_REVIEWED",
    AccountVerified => "ACCOUNT_VERIFIED",
    BookingUpdate => "BOOKING_UPDATE",
    ReservationUpdate => "RESERVATION_UPDATE",
    ApplicationReceived => "APPLICATION_RECEIVED",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub reference_id: Option<i64>,
    pub is_read: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}
