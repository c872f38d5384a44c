use chrono::NaiveDate;
use collab_exchange::config::EngineConfig;
use collab_exchange::marketplace::clock::Clock;
use collab_exchange::marketplace::notifications::SubscriberProfile;
use collab_exchange::marketplace::{Inbox, LedgerError, Marketplace, Member, Role};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Notifications retained for `GET /api/v1/notifications`.
pub(crate) const FEED_CAPACITY: usize = 512;

/// Opening balance granted to every seeded member.
pub(crate) const SEED_POINTS: u64 = 10_000;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) feed: Arc<Inbox>,
}

/// In-memory engine plus the bounded feed observing every notification it emits.
pub(crate) struct Bootstrap {
    pub(crate) engine: Arc<Marketplace>,
    pub(crate) feed: Arc<Inbox>,
}

pub(crate) fn bootstrap(
    config: EngineConfig,
    clock: Arc<dyn Clock>,
) -> Result<Bootstrap, LedgerError> {
    let engine = Arc::new(Marketplace::in_memory(config, clock));
    let feed = Arc::new(Inbox::with_capacity(FEED_CAPACITY));
    engine
        .dispatcher
        .subscribe(SubscriberProfile::observer(), feed.clone());

    for member in seed_members() {
        engine.register_member(member)?;
    }

    Ok(Bootstrap { engine, feed })
}

/// The four accounts the marketplace starts with.
pub(crate) fn seed_members() -> Vec<Member> {
    vec![
        Member::new("admin", "Administrator", Role::Admin, SEED_POINTS),
        Member::new("president", "President", Role::President, SEED_POINTS),
        Member::new("employee1", "Employee One", Role::Employee, SEED_POINTS),
        Member::new("employee2", "Employee Two", Role::Employee, SEED_POINTS),
    ]
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_exchange::marketplace::{SystemClock, UserId};

    #[test]
    fn bootstrap_seeds_members_with_opening_balances() {
        let Bootstrap { engine, .. } =
            bootstrap(EngineConfig::default(), Arc::new(SystemClock)).expect("bootstrap");

        for member in seed_members() {
            assert_eq!(
                engine.ledger.balance_of(&member.id).expect("balance"),
                SEED_POINTS
            );
        }
        assert!(engine
            .ledger
            .balance_of(&UserId::new("stranger"))
            .is_err());
    }

    #[test]
    fn parse_date_reports_the_raw_value() {
        assert_eq!(
            parse_date(" 2025-10-15 ").expect("date"),
            NaiveDate::from_ymd_opt(2025, 10, 15).expect("valid")
        );
        let err = parse_date("15/10/2025").expect_err("wrong format");
        assert!(err.contains("15/10/2025"));
    }
}
