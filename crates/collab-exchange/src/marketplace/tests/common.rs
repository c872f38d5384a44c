use std::sync::{Arc, Mutex, Weak};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::config::EngineConfig;
use crate::marketplace::clock::ManualClock;
use crate::marketplace::domain::{Actor, DemandDraft, Member, RewardType, Role, Urgency, UserId};
use crate::marketplace::engine::{Marketplace, Repositories};
use crate::marketplace::ledger::{EscrowPolicy, LedgerTransaction};
use crate::marketplace::memory::InMemoryLedger;
use crate::marketplace::notifications::{
    DeliveryError, DomainEvent, Inbox, Notification, Subscriber, SubscriberProfile,
};
use crate::marketplace::repository::{LedgerRepository, RepositoryError};

/// Wednesday 2025-10-15 09:00 UTC.
pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 10, 15, 9, 0, 0)
        .single()
        .expect("valid instant")
}

pub(super) struct Harness {
    pub(super) engine: Arc<Marketplace>,
    pub(super) clock: Arc<ManualClock>,
    pub(super) feed: Arc<Inbox>,
}

pub(super) fn members() -> Vec<Member> {
    vec![
        Member::new("admin", "Avery Admin", Role::Admin, 10_000),
        Member::new("president", "Pat President", Role::President, 10_000),
        Member::new("alice", "Alice", Role::Employee, 1_000),
        Member::new("bob", "Bob", Role::Employee, 300),
        Member::new("carol", "Carol", Role::Employee, 500),
    ]
}

pub(super) fn harness(policy: EscrowPolicy) -> Harness {
    harness_with(Repositories::in_memory(), policy)
}

pub(super) fn harness_with(repositories: Repositories, policy: EscrowPolicy) -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let config = EngineConfig {
        escrow_policy: policy,
        ..EngineConfig::default()
    };
    let engine = Marketplace::new(repositories, config, clock.clone());
    let feed = Arc::new(Inbox::with_capacity(512));
    engine
        .dispatcher
        .subscribe(SubscriberProfile::observer(), feed.clone());
    for member in members() {
        engine.register_member(member).expect("member registers");
    }
    Harness {
        engine: Arc::new(engine),
        clock,
        feed,
    }
}

pub(super) fn admin() -> Actor {
    Actor::new("admin", Role::Admin, "Avery Admin")
}

pub(super) fn president() -> Actor {
    Actor::new("president", Role::President, "Pat President")
}

pub(super) fn alice() -> Actor {
    Actor::new("alice", Role::Employee, "Alice")
}

pub(super) fn bob() -> Actor {
    Actor::new("bob", Role::Employee, "Bob")
}

pub(super) fn carol() -> Actor {
    Actor::new("carol", Role::Employee, "Carol")
}

pub(super) fn points_draft(reward_value: u64) -> DemandDraft {
    DemandDraft {
        title: "Prepare client pitch deck".to_string(),
        description: "Twelve slides for the Thursday review".to_string(),
        customer_info: "Northwind".to_string(),
        tags: vec!["design".to_string()],
        urgency: Urgency::Urgent,
        reward_type: RewardType::Points,
        reward_value,
    }
}

pub(super) fn amount_draft(reward_value: u64) -> DemandDraft {
    DemandDraft {
        reward_type: RewardType::Amount,
        ..points_draft(reward_value)
    }
}

/// Event names in the order the observer feed received them.
pub(super) fn event_names(feed: &Inbox) -> Vec<&'static str> {
    feed.notifications()
        .iter()
        .map(|notification| notification.event.name())
        .collect()
}

pub(super) fn events_for(feed: &Inbox, user: &str) -> Vec<DomainEvent> {
    feed.notifications()
        .into_iter()
        .filter(|notification| notification.audience.target_user == Some(UserId::new(user)))
        .map(|notification| notification.event)
        .collect()
}

/// Ledger that can be told to refuse appends for one member.
#[derive(Default)]
pub(super) struct SwitchableLedger {
    inner: InMemoryLedger,
    failing: Mutex<Option<UserId>>,
}

impl SwitchableLedger {
    pub(super) fn fail_for(&self, user: &str) {
        *self.failing.lock().expect("switch mutex poisoned") = Some(UserId::new(user));
    }
}

impl LedgerRepository for SwitchableLedger {
    fn append(&self, entry: LedgerTransaction) -> Result<(), RepositoryError> {
        let failing = self.failing.lock().expect("switch mutex poisoned").clone();
        if failing.as_ref() == Some(&entry.user_id) {
            return Err(RepositoryError::Unavailable("ledger offline".to_string()));
        }
        self.inner.append(entry)
    }

    fn latest(&self, user: &UserId) -> Result<Option<LedgerTransaction>, RepositoryError> {
        self.inner.latest(user)
    }

    fn history(&self, user: Option<&UserId>) -> Result<Vec<LedgerTransaction>, RepositoryError> {
        self.inner.history(user)
    }
}

/// Observer that, on every balance notification, sums member balances and escrow still
/// held by live demands.
pub(super) struct LedgerAuditor {
    engine: Weak<Marketplace>,
    sums: Mutex<Vec<u64>>,
}

impl LedgerAuditor {
    pub(super) fn attach(engine: &Arc<Marketplace>) -> Arc<Self> {
        let auditor = Arc::new(Self {
            engine: Arc::downgrade(engine),
            sums: Mutex::new(Vec::new()),
        });
        engine
            .dispatcher
            .subscribe(SubscriberProfile::observer(), auditor.clone());
        auditor
    }

    pub(super) fn sums(&self) -> Vec<u64> {
        self.sums.lock().expect("auditor mutex poisoned").clone()
    }
}

impl Subscriber for LedgerAuditor {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        if !matches!(notification.event, DomainEvent::BalanceChanged { .. }) {
            return Ok(());
        }
        let engine = self.engine.upgrade().ok_or(DeliveryError::Closed)?;
        let balances = engine.ledger.total_balance().expect("total balance");
        let escrow = engine.lifecycle.outstanding_escrow().expect("outstanding escrow");
        self.sums
            .lock()
            .expect("auditor mutex poisoned")
            .push(balances + escrow);
        Ok(())
    }
}

/// Subscriber that refuses everything.
pub(super) struct RejectingSubscriber;

impl Subscriber for RejectingSubscriber {
    fn deliver(&self, _notification: &Notification) -> Result<(), DeliveryError> {
        Err(DeliveryError::Rejected("mailbox full".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
