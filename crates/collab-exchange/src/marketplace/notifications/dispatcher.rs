use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};

use super::events::Notification;
use crate::marketplace::domain::{Role, UserId};

/// Outbound seam used by the ledger and the lifecycle to emit notifications.
pub trait EventSink: Send + Sync {
    fn publish(&self, notification: Notification);
}

/// Receiving end registered with the dispatcher.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber rejected notification: {0}")]
    Rejected(String),
    #[error("subscriber is closed")]
    Closed,
}

/// Identity a subscriber is registered under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberProfile {
    pub user_id: Option<UserId>,
    pub role: Option<Role>,
    /// Feed or audit subscribers receive every notification and filter on read.
    pub observe_all: bool,
}

impl SubscriberProfile {
    pub fn member(user_id: UserId, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
            observe_all: false,
        }
    }

    pub fn observer() -> Self {
        Self {
            observe_all: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Outcome of a single fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub notification_id: u64,
    pub matched: usize,
    pub delivered: usize,
    pub dropped: usize,
}

struct Registration {
    id: SubscriptionId,
    profile: SubscriberProfile,
    subscriber: Arc<dyn Subscriber>,
}

/// Best-effort, synchronous, in-memory fan-out.
///
/// Each published notification reaches each matching subscriber at most once. Delivery
/// failures are logged and dropped; they never propagate to the publisher.
#[derive(Default)]
pub struct NotificationDispatcher {
    registry: RwLock<Vec<Registration>>,
    next_subscription: AtomicU64,
    next_notification: AtomicU64,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &self,
        profile: SubscriberProfile,
        subscriber: Arc<dyn Subscriber>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed) + 1);
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        registry.push(Registration {
            id,
            profile,
            subscriber,
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let before = registry.len();
        registry.retain(|registration| registration.id != id);
        registry.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn dispatch(&self, mut notification: Notification) -> DispatchReport {
        notification.id = self.next_notification.fetch_add(1, Ordering::Relaxed) + 1;

        // Snapshot the matching subscribers so delivery runs without the registry lock and
        // a subscriber may (un)subscribe from inside `deliver`.
        let targets: Vec<(SubscriptionId, Arc<dyn Subscriber>)> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .iter()
                .filter(|registration| matches(&registration.profile, &notification))
                .map(|registration| (registration.id, registration.subscriber.clone()))
                .collect()
        };

        let mut report = DispatchReport {
            notification_id: notification.id,
            matched: targets.len(),
            ..DispatchReport::default()
        };

        for (subscription, subscriber) in targets {
            match subscriber.deliver(&notification) {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    report.dropped += 1;
                    warn!(
                        subscription = subscription.0,
                        notification = notification.id,
                        event = notification.event.name(),
                        %error,
                        "dropping undeliverable notification"
                    );
                }
            }
        }

        debug!(
            notification = notification.id,
            event = notification.event.name(),
            matched = report.matched,
            delivered = report.delivered,
            "notification dispatched"
        );
        report
    }
}

impl EventSink for NotificationDispatcher {
    fn publish(&self, notification: Notification) {
        self.dispatch(notification);
    }
}

fn matches(profile: &SubscriberProfile, notification: &Notification) -> bool {
    profile.observe_all
        || notification
            .audience
            .admits(profile.user_id.as_ref(), profile.role)
}
