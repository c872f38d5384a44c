use std::sync::Arc;

use tracing::info;

use super::activity::ActivityScorer;
use super::clock::Clock;
use super::domain::Member;
use super::ledger::{LedgerError, PointsLedger};
use super::lifecycle::DemandLifecycle;
use super::memory::{InMemoryActivity, InMemoryDemands, InMemoryLedger, InMemoryMembers};
use super::notifications::{EventSink, NotificationDispatcher};
use super::repository::{
    ActivityRepository, DemandRepository, LedgerRepository, MemberRepository,
};
use crate::config::EngineConfig;

/// Storage backends the engine is built over.
pub struct Repositories {
    pub members: Arc<dyn MemberRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
    pub demands: Arc<dyn DemandRepository>,
    pub activity: Arc<dyn ActivityRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            members: Arc::new(InMemoryMembers::default()),
            ledger: Arc::new(InMemoryLedger::default()),
            demands: Arc::new(InMemoryDemands::default()),
            activity: Arc::new(InMemoryActivity::default()),
        }
    }
}

/// The four marketplace components wired over shared storage, one clock and one
/// dispatcher.
pub struct Marketplace {
    pub members: Arc<dyn MemberRepository>,
    pub ledger: Arc<PointsLedger>,
    pub lifecycle: Arc<DemandLifecycle>,
    pub activity: Arc<ActivityScorer>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub config: EngineConfig,
}

impl Marketplace {
    pub fn new(repositories: Repositories, config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new());
        let events: Arc<dyn EventSink> = dispatcher.clone();

        let ledger = Arc::new(PointsLedger::new(
            repositories.members.clone(),
            repositories.ledger,
            events.clone(),
            clock.clone(),
            config.escrow_policy,
        ));
        let lifecycle = Arc::new(DemandLifecycle::new(
            repositories.demands,
            repositories.members.clone(),
            ledger.clone(),
            events,
            clock.clone(),
        ));
        let activity = Arc::new(ActivityScorer::new(
            repositories.activity,
            repositories.members.clone(),
            clock,
            config.utc_offset,
        ));

        Self {
            members: repositories.members,
            ledger,
            lifecycle,
            activity,
            dispatcher,
            config,
        }
    }

    pub fn in_memory(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(Repositories::in_memory(), config, clock)
    }

    /// Add a member with their opening balance.
    pub fn register_member(&self, member: Member) -> Result<Member, LedgerError> {
        let member = self.members.insert(member)?;
        info!(
            member = %member.id,
            role = member.role.label(),
            opening_points = member.opening_points,
            "member registered"
        );
        Ok(member)
    }
}
