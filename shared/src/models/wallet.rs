//! Payee wallets, ledger entries and withdrawals

use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};
use crate::pricing::to_decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTransactionType {
    Earning,
    Withdrawal,
    Refund,
    Commission,
    Adjustment,
}

db_enum!(WalletTransactionType {
    Earning => "EARNING",
    Withdrawal => "WITHDRAWAL",
    Refund => "REFUND",
    Commission => "COMMISSION",
    Adjustment => "ADJUSTMENT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

db_enum!(TransactionStatus {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Rejected,
    Cancelled,
}

db_enum!(WithdrawalStatus {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
    Rejected => "REJECTED",
    Cancelled => "CANCELLED",
});

impl WithdrawalStatus {
    pub fn can_transition_to(&self, next: Self) -> bool {
        use WithdrawalStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    /// Still holding the user's funds
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Wallet row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Wallet {
    pub user_id: i64,
    /// Spendable funds
    pub balance: f64,
    /// Funds reserved by open withdrawals
    pub pending_balance: f64,
    pub total_earned: f64,
    pub total_withdrawn: f64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct WalletTransaction {
    pub id: i64,
    pub user_id: i64,
    pub kind: String,
    pub amount: f64,
    pub status: String,
    pub reference_id: Option<i64>,
    pub description: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    pub amount: f64,
    pub status: String,
    pub iban_last4: String,
    pub review_required: bool,
    pub priority: i32,
    pub transaction_id: i64,
    pub processed_by: Option<i64>,
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}

impl Withdrawal {
    pub fn status(&self) -> Option<WithdrawalStatus> {
        WithdrawalStatus::from_db(&self.status)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: f64,
    pub iban: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalAction {
    /// PENDING → PROCESSING
    Approve,
    /// PROCESSING → COMPLETED
    Complete,
    /// PROCESSING → FAILED, funds returned
    Fail,
    /// PENDING → REJECTED, funds returned
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessWithdrawalRequest {
    pub action: WithdrawalAction,
    pub reason: Option<String>,
}

impl WithdrawalAction {
    pub fn target(&self) -> WithdrawalStatus {
        match self {
            Self::Approve => WithdrawalStatus::Processing,
            Self::Complete => WithdrawalStatus::Completed,
            Self::Fail => WithdrawalStatus::Failed,
            Self::Reject => WithdrawalStatus::Rejected,
        }
    }

    /// The reserved amount goes back to the spendable balance
    pub fn returns_funds(&self) -> bool {
        matches!(self, Self::Fail | Self::Reject)
    }
}

/// Withdrawals above this amount go through manual review
pub const REVIEW_THRESHOLD: f64 = 1000.0;
/// Withdrawals above this amount are processed first
pub const PRIORITY_THRESHOLD: f64 = 500.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalPlan {
    pub review_required: bool,
    pub priority: i32,
}

/// Validate a withdrawal request against the wallet state.
pub fn plan_withdrawal(
    amount: f64,
    available: f64,
    minimum: f64,
    has_open_withdrawal: bool,
) -> Result<WithdrawalPlan, AppError> {
    let requested = to_decimal(amount);
    if requested < to_decimal(minimum) {
        return Err(AppError::new(ErrorCode::WithdrawalBelowMinimum).with_detail("minimum", minimum));
    }
    if requested > to_decimal(available) {
        return Err(AppError::new(ErrorCode::InsufficientBalance).with_detail("available", available));
    }
    if has_open_withdrawal {
        return Err(AppError::new(ErrorCode::WithdrawalAlreadyPending));
    }
    Ok(WithdrawalPlan {
        review_required: requested > to_decimal(REVIEW_THRESHOLD),
        priority: i32::from(requested > to_decimal(PRIORITY_THRESHOLD)),
    })
}

/// Keep only the last four characters of an IBAN
pub fn mask_iban(iban: &str) -> Result<String, AppError> {
    let compact: String = iban.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.len() < 15 || compact.len() > 34 || !compact.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::with_message(ErrorCode::InvalidFormat, "Invalid IBAN"));
    }
    Ok(compact[compact.len() - 4..].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_withdrawal_ok() {
        let plan = plan_withdrawal(100.0, 200.0, 10.0, false).unwrap();
        assert!(!plan.review_required);
        assert_eq!(plan.priority, 0);

        let plan = plan_withdrawal(600.0, 2000.0, 10.0, false).unwrap();
        assert!(!plan.review_required);
        assert_eq!(plan.priority, 1);

        let plan = plan_withdrawal(1500.0, 2000.0, 10.0, false).unwrap();
        assert!(plan.review_required);
        assert_eq!(plan.priority, 1);
    }

    #[test]
    fn test_plan_withdrawal_rejections() {
        assert_eq!(
            plan_withdrawal(5.0, 200.0, 10.0, false).unwrap_err().code,
            ErrorCode::WithdrawalBelowMinimum
        );
        assert_eq!(
            plan_withdrawal(300.0, 200.0, 10.0, false).unwrap_err().code,
            ErrorCode::InsufficientBalance
        );
        assert_eq!(
            plan_withdrawal(50.0, 200.0, 10.0, true).unwrap_err().code,
            ErrorCode::WithdrawalAlreadyPending
        );
        // exactly the minimum and exactly the balance are fine
        assert!(plan_withdrawal(10.0, 10.0, 10.0, false).is_ok());
    }

    #[test]
    fn test_withdrawal_transitions() {
        use WithdrawalStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Pending.is_open() && Processing.is_open());
        assert!(!Rejected.is_open());
    }

    #[test]
    fn test_action_targets() {
        assert_eq!(WithdrawalAction::Approve.target(), WithdrawalStatus::Processing);
        assert!(WithdrawalAction::Reject.returns_funds());
        assert!(!WithdrawalAction::Complete.returns_funds());
    }

    #[test]
    fn test_mask_iban() {
        assert_eq!(mask_iban("FR76 3000 6000 0112 3456 7890 189").unwrap(), "0189");
        assert!(mask_iban("FR76").is_err());
        assert!(mask_iban("FR76-3000-6000-0112-3456").is_err());
    }
}
