use chrono::NaiveDate;

use super::activity::ActivityRecord;
use super::domain::{Demand, DemandId, Member, UserId};
use super::ledger::LedgerTransaction;

/// Member directory. Balances are written only through the ledger.
pub trait MemberRepository: Send + Sync {
    fn insert(&self, member: Member) -> Result<Member, RepositoryError>;
    fn fetch(&self, id: &UserId) -> Result<Option<Member>, RepositoryError>;
    fn store_points(&self, id: &UserId, points: u64) -> Result<(), RepositoryError>;
    fn list(&self) -> Result<Vec<Member>, RepositoryError>;
}

/// Append-only transaction log.
pub trait LedgerRepository: Send + Sync {
    /// Appends `entry` only if it directly follows the member's latest sequence number;
    /// otherwise fails with [`RepositoryError::Conflict`].
    fn append(&self, entry: LedgerTransaction) -> Result<(), RepositoryError>;
    fn latest(&self, user: &UserId) -> Result<Option<LedgerTransaction>, RepositoryError>;
    /// Entries in append order, optionally narrowed to one member.
    fn history(&self, user: Option<&UserId>) -> Result<Vec<LedgerTransaction>, RepositoryError>;
}

/// Demand storage with compare-and-swap updates keyed on [`Demand::version`].
pub trait DemandRepository: Send + Sync {
    fn insert(&self, demand: Demand) -> Result<Demand, RepositoryError>;
    fn fetch(&self, id: &DemandId) -> Result<Option<Demand>, RepositoryError>;
    /// Stores `demand` if the stored version still equals `demand.version`, returning the
    /// record with its bumped version.
    fn update(&self, demand: Demand) -> Result<Demand, RepositoryError>;
    fn list(&self) -> Result<Vec<Demand>, RepositoryError>;
}

pub trait ActivityRepository: Send + Sync {
    fn fetch(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<ActivityRecord>, RepositoryError>;
    fn upsert(&self, record: ActivityRecord) -> Result<(), RepositoryError>;
    /// Records whose date falls in `start..=end`.
    fn between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
