//! Bounded daily engagement accounting and weekly leaderboards.

mod calendar;
mod scorer;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{Role, UserId};
use super::repository::RepositoryError;
use super::ErrorKind;

pub use calendar::{local_date, WeekWindow};
pub use scorer::{ActivityScorer, ActivitySummary, Leaderboard, LeaderboardEntry};

/// Counted actions per member per calendar day. Further actions that day are ignored.
pub const DAILY_ACTIVITY_CAP: u8 = 3;

/// One member's engagement on one calendar day. Never decremented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub count: u8,
    pub last_active_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("range start {start} is after range end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
    #[error("role {} is not ranked on leaderboards", .0.label())]
    UnrankedRole(Role),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ActivityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ActivityError::InvertedRange { .. } | ActivityError::UnrankedRole(_) => {
                ErrorKind::InvalidInput
            }
            ActivityError::Repository(error) => ErrorKind::from(error),
        }
    }
}
