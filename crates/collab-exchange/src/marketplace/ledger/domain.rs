use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::marketplace::domain::UserId;
use crate::marketplace::repository::RepositoryError;
use crate::marketplace::ErrorKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Closed set of reasons a balance may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LedgerReason {
    EscrowDebit,
    SettlementCredit,
    /// Compensates an escrow debit whose demand could not be stored.
    EscrowRefund,
    ManualAdjustment,
}

impl LedgerReason {
    pub const fn label(self) -> &'static str {
        match self {
            LedgerReason::EscrowDebit => "escrow-debit",
            LedgerReason::SettlementCredit => "settlement-credit",
            LedgerReason::EscrowRefund => "escrow-refund",
            LedgerReason::ManualAdjustment => "manual-adjustment",
        }
    }
}

/// Who caused a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Operator {
    System,
    Admin(UserId),
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::System => f.write_str("system"),
            Operator::Admin(id) => write!(f, "admin:{id}"),
        }
    }
}

/// How a debit larger than the current balance is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowPolicy {
    /// Floor the balance at zero and record the unmet remainder as `shortfall`.
    #[default]
    ClampAtZero,
    /// Refuse the debit with [`LedgerError::InsufficientFunds`].
    StrictRefusal,
}

impl EscrowPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "clamp" | "clamp_at_zero" => Some(Self::ClampAtZero),
            "strict" | "strict_refusal" => Some(Self::StrictRefusal),
            _ => None,
        }
    }
}

/// Immutable, append-only record of one balance change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    /// Per-member position in the log, starting at 1.
    pub sequence: u64,
    pub change_amount: i64,
    pub balance_after: u64,
    /// Portion of a clamped debit that could not be withheld.
    pub shortfall: u64,
    pub reason: LedgerReason,
    pub operator: Operator,
    pub created_at: DateTime<Utc>,
}

/// Result handed back to callers of a ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReceipt {
    pub transaction_id: TransactionId,
    pub new_balance: u64,
    pub change_amount: i64,
    pub shortfall: u64,
}

impl From<&LedgerTransaction> for LedgerReceipt {
    fn from(entry: &LedgerTransaction) -> Self {
        Self {
            transaction_id: entry.id.clone(),
            new_balance: entry.balance_after,
            change_amount: entry.change_amount,
            shortfall: entry.shortfall,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "user_id", rename_all = "snake_case")]
pub enum HistoryScope {
    Member(UserId),
    All,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    ZeroAmount,
    #[error("adjustment delta must be non-zero")]
    ZeroAdjustment,
    #[error("amount {0} is outside the supported range")]
    OutOfRange(u64),
    #[error("insufficient funds for {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user: UserId,
        balance: u64,
        requested: u64,
    },
    #[error("member {0} not found")]
    UnknownMember(UserId),
    #[error("{caller} is not permitted to {action}")]
    Forbidden {
        caller: UserId,
        action: &'static str,
    },
    #[error("ledger of {0} was modified concurrently; retry the command")]
    ConcurrentModification(UserId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ZeroAmount | LedgerError::ZeroAdjustment | LedgerError::OutOfRange(_) => {
                ErrorKind::InvalidInput
            }
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::UnknownMember(_) => ErrorKind::NotFound,
            LedgerError::Forbidden { .. } => ErrorKind::Forbidden,
            LedgerError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            LedgerError::Repository(error) => ErrorKind::from(error),
        }
    }
}
