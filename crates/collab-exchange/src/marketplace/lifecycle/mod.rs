//! Demand state machine: Published → Accepted → Completed, with escrow on publish and
//! settlement on completion.

mod service;

use std::fmt;

use serde::Serialize;

use super::domain::{DemandId, DemandStatus, Role, UserId};
use super::ledger::LedgerError;
use super::repository::RepositoryError;
use super::ErrorKind;

pub use service::DemandLifecycle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    Publish,
    Accept,
    Complete,
    Recommend,
    Revise,
    Delete,
    Comment,
}

impl LifecycleCommand {
    pub const fn label(self) -> &'static str {
        match self {
            LifecycleCommand::Publish => "publish",
            LifecycleCommand::Accept => "accept",
            LifecycleCommand::Complete => "complete",
            LifecycleCommand::Recommend => "recommend",
            LifecycleCommand::Revise => "revise",
            LifecycleCommand::Delete => "delete",
            LifecycleCommand::Comment => "comment on",
        }
    }
}

impl fmt::Display for LifecycleCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a guard rejected a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "guard", content = "detail", rename_all = "snake_case")]
pub enum GuardFailure {
    #[error("the command is not available in this status")]
    StatusNotAllowed,
    #[error("creators cannot accept their own demand")]
    SelfAcceptance,
    #[error("only the creator or an administrator may do this")]
    NotCreator,
    #[error("role {} may not do this", .0.label())]
    RoleNotPermitted(Role),
    #[error("the demand is in a terminal status")]
    Terminal,
    #[error("no helper is assigned")]
    MissingHelper,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {command} demand {demand_id} while it is {current}: {reason}")]
    InvalidTransition {
        demand_id: DemandId,
        current: DemandStatus,
        command: LifecycleCommand,
        reason: GuardFailure,
    },
    #[error("demand {0} not found")]
    NotFound(DemandId),
    #[error("member {0} not found")]
    UnknownMember(UserId),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("demand {0} was modified concurrently; retry the command")]
    ConcurrentModification(DemandId),
    #[error("points ledger rejected the transition: {0}")]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl LifecycleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LifecycleError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            LifecycleError::NotFound(_) | LifecycleError::UnknownMember(_) => ErrorKind::NotFound,
            LifecycleError::InvalidInput(_) => ErrorKind::InvalidInput,
            LifecycleError::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            LifecycleError::Ledger(error) => error.kind(),
            LifecycleError::Repository(error) => ErrorKind::from(error),
        }
    }

    fn storage(demand_id: &DemandId, error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict => LifecycleError::ConcurrentModification(demand_id.clone()),
            RepositoryError::NotFound => LifecycleError::NotFound(demand_id.clone()),
            other => LifecycleError::Repository(other),
        }
    }
}
