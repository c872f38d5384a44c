//! Points escrow and settlement.

mod domain;
mod service;

pub use domain::{
    EscrowPolicy, HistoryScope, LedgerError, LedgerReason, LedgerReceipt, LedgerTransaction,
    Operator, TransactionId,
};
pub use service::{HeldEntry, PointsLedger};
