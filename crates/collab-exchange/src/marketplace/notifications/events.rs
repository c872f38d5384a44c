use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::marketplace::domain::{DemandId, RewardType, Role, UserId};
use crate::marketplace::ledger::LedgerReason;

/// Facts emitted by the lifecycle and the ledger. Not persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    DemandPublished {
        demand_id: DemandId,
        title: String,
        creator_id: UserId,
        creator_name: String,
        reward_type: RewardType,
        reward_value: u64,
    },
    DemandAccepted {
        demand_id: DemandId,
        title: String,
        helper_id: UserId,
        helper_name: String,
    },
    DemandCompleted {
        demand_id: DemandId,
        title: String,
        creator_name: String,
        helper_name: String,
        reward_type: RewardType,
        reward_value: u64,
    },
    DemandRecommended {
        demand_id: DemandId,
        title: String,
    },
    CommentAdded {
        demand_id: DemandId,
        title: String,
        author_name: String,
    },
    BalanceChanged {
        user_id: UserId,
        change_amount: i64,
        balance_after: u64,
        reason: LedgerReason,
    },
}

impl DomainEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            DomainEvent::DemandPublished { .. } => "demand_published",
            DomainEvent::DemandAccepted { .. } => "demand_accepted",
            DomainEvent::DemandCompleted { .. } => "demand_completed",
            DomainEvent::DemandRecommended { .. } => "demand_recommended",
            DomainEvent::CommentAdded { .. } => "comment_added",
            DomainEvent::BalanceChanged { .. } => "balance_changed",
        }
    }

    fn level(&self) -> NotificationLevel {
        match self {
            DomainEvent::DemandAccepted { .. } | DomainEvent::DemandCompleted { .. } => {
                NotificationLevel::Success
            }
            DomainEvent::BalanceChanged { change_amount, .. } if *change_amount < 0 => {
                NotificationLevel::Warning
            }
            _ => NotificationLevel::Info,
        }
    }

    fn render(&self) -> (String, String) {
        match self {
            DomainEvent::DemandPublished {
                title,
                creator_name,
                reward_type,
                reward_value,
                ..
            } => (
                "New demand published".to_string(),
                format!(
                    "{creator_name} posted \"{title}\" offering {}",
                    describe_reward(*reward_type, *reward_value)
                ),
            ),
            DomainEvent::DemandAccepted {
                title, helper_name, ..
            } => (
                "Demand accepted".to_string(),
                format!("{helper_name} accepted \"{title}\""),
            ),
            DomainEvent::DemandCompleted {
                title,
                helper_name,
                reward_type,
                reward_value,
                ..
            } => (
                "Demand completed".to_string(),
                format!(
                    "\"{title}\" was completed by {helper_name}; reward {}",
                    describe_reward(*reward_type, *reward_value)
                ),
            ),
            DomainEvent::DemandRecommended { title, .. } => (
                "Demand recommended".to_string(),
                format!("\"{title}\" was recommended by branch management"),
            ),
            DomainEvent::CommentAdded {
                title, author_name, ..
            } => (
                "New comment".to_string(),
                format!("{author_name} commented on \"{title}\""),
            ),
            DomainEvent::BalanceChanged {
                change_amount,
                balance_after,
                reason,
                ..
            } => (
                "Points balance changed".to_string(),
                format!(
                    "{change_amount:+} points ({}); balance is now {balance_after}",
                    reason.label()
                ),
            ),
        }
    }
}

fn describe_reward(reward_type: RewardType, value: u64) -> String {
    match reward_type {
        RewardType::Points => format!("{value} points"),
        RewardType::Amount => format!("an amount of {value}"),
    }
}

/// Delivery target. With neither field set the notification is a broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Audience {
    pub target_user: Option<UserId>,
    pub target_role: Option<Role>,
}

impl Audience {
    pub fn user(user: UserId) -> Self {
        Self {
            target_user: Some(user),
            target_role: None,
        }
    }

    pub fn role(role: Role) -> Self {
        Self {
            target_user: None,
            target_role: Some(role),
        }
    }

    pub fn everyone() -> Self {
        Self::default()
    }

    pub fn is_broadcast(&self) -> bool {
        self.target_user.is_none() && self.target_role.is_none()
    }

    /// Whether a recipient with the given identity is addressed.
    pub fn admits(&self, user: Option<&UserId>, role: Option<Role>) -> bool {
        if self.is_broadcast() {
            return true;
        }
        let user_match =
            matches!((&self.target_user, user), (Some(target), Some(id)) if target == id);
        let role_match = matches!((self.target_role, role), (Some(target), Some(r)) if target == r);
        user_match || role_match
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
}

/// Routable envelope around a [`DomainEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Assigned by the dispatcher; zero until published.
    pub id: u64,
    pub event: DomainEvent,
    pub audience: Audience,
    pub level: NotificationLevel,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(event: DomainEvent, audience: Audience, timestamp: DateTime<Utc>) -> Self {
        let level = event.level();
        let (title, content) = event.render();
        Self {
            id: 0,
            event,
            audience,
            level,
            title,
            content,
            timestamp,
        }
    }
}
