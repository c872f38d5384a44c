//! Demand marketplace core: demand lifecycle with points escrow, the points ledger,
//! daily activity scoring, and event fan-out.

pub mod activity;
pub mod clock;
pub mod domain;
pub mod engine;
pub mod import;
pub mod ledger;
pub mod lifecycle;
pub mod locks;
pub mod memory;
pub mod notifications;
pub mod repository;
pub mod router;

#[cfg(test)]
mod tests;

use axum::http::StatusCode;
use serde::Serialize;

use self::repository::RepositoryError;

pub use activity::{ActivityError, ActivityScorer, Leaderboard, LeaderboardEntry, WeekWindow};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    Actor, Comment, Demand, DemandDraft, DemandId, DemandRevision, DemandStatus, Helper, Member,
    RewardType, Role, Urgency, UserId,
};
pub use engine::{Marketplace, Repositories};
pub use import::{DemandImportError, DemandImporter, ImportSummary};
pub use ledger::{EscrowPolicy, HistoryScope, LedgerError, LedgerReason, PointsLedger};
pub use lifecycle::{DemandLifecycle, GuardFailure, LifecycleCommand, LifecycleError};
pub use notifications::{Audience, DomainEvent, Inbox, Notification, NotificationDispatcher};
pub use router::marketplace_router;

/// Error taxonomy shared by every marketplace component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidTransition,
    InsufficientFunds,
    NotFound,
    ConcurrentModification,
    Forbidden,
    InvalidInput,
    Unavailable,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::NotFound => "not_found",
            ErrorKind::ConcurrentModification => "concurrent_modification",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unavailable => "unavailable",
        }
    }

    pub const fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::InvalidTransition | ErrorKind::ConcurrentModification => {
                StatusCode::CONFLICT
            }
            ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether the caller may simply retry the same command.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::ConcurrentModification | ErrorKind::Unavailable
        )
    }
}

impl From<&RepositoryError> for ErrorKind {
    fn from(error: &RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict => ErrorKind::ConcurrentModification,
            RepositoryError::NotFound => ErrorKind::NotFound,
            RepositoryError::Unavailable(_) => ErrorKind::Unavailable,
        }
    }
}
