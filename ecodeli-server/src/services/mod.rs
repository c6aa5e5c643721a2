//! Business operations spanning several tables

pub mod escrow;
pub mod notify;
pub mod storage;
pub mod verification;
pub mod wallet;
