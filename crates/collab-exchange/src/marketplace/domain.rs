use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for marketplace members.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for demands.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DemandId(pub String);

impl fmt::Display for DemandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role classes resolved by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    President,
    VicePresident,
    Employee,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::President => "president",
            Role::VicePresident => "vice_president",
            Role::Employee => "employee",
        }
    }

    /// Roles allowed to curate recommendations and excluded from peer rankings.
    pub const fn is_management(self) -> bool {
        matches!(self, Role::Admin | Role::President | Role::VicePresident)
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "president" => Some(Role::President),
            "vp" | "vice_president" | "vice-president" => Some(Role::VicePresident),
            "employee" => Some(Role::Employee),
            _ => None,
        }
    }
}

/// Resolved caller identity handed over by the session layer. Trusted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            role,
            display_name: display_name.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Registered member. `points` caches the balance after the member's latest ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: UserId,
    pub display_name: String,
    pub role: Role,
    pub opening_points: u64,
    pub points: u64,
}

impl Member {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: Role,
        opening_points: u64,
    ) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
            role,
            opening_points,
            points: opening_points,
        }
    }

    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.id.clone(),
            role: self.role,
            display_name: self.display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandStatus {
    Draft,
    Pending,
    Published,
    Accepted,
    Completed,
    Closed,
}

impl DemandStatus {
    pub const fn label(self) -> &'static str {
        match self {
            DemandStatus::Draft => "draft",
            DemandStatus::Pending => "pending",
            DemandStatus::Published => "published",
            DemandStatus::Accepted => "accepted",
            DemandStatus::Completed => "completed",
            DemandStatus::Closed => "closed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, DemandStatus::Completed | DemandStatus::Closed)
    }

    /// Statuses in which a helper must be assigned.
    pub const fn has_helper(self) -> bool {
        matches!(self, DemandStatus::Accepted | DemandStatus::Completed)
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardType {
    Points,
    Amount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    #[default]
    Normal,
    Urgent,
    Extreme,
}

impl Urgency {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "normal" => Some(Urgency::Normal),
            "urgent" => Some(Urgency::Urgent),
            "extreme" => Some(Urgency::Extreme),
            _ => None,
        }
    }
}

/// Member who took on a demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Helper {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author_id: UserId,
    pub author_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Creator-supplied fields for a new demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub customer_info: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub urgency: Urgency,
    pub reward_type: RewardType,
    pub reward_value: u64,
}

/// Editable subset of a published demand. Reward terms are fixed once escrow is taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandRevision {
    pub title: Option<String>,
    pub description: Option<String>,
    pub customer_info: Option<String>,
    pub tags: Option<Vec<String>>,
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Demand {
    pub id: DemandId,
    pub title: String,
    pub description: String,
    pub customer_info: String,
    pub tags: Vec<String>,
    pub urgency: Urgency,
    pub reward_type: RewardType,
    pub reward_value: u64,
    /// Points actually withheld from the creator at publish time.
    pub escrowed: u64,
    pub is_recommended: bool,
    pub status: DemandStatus,
    pub creator_id: UserId,
    pub creator_name: String,
    pub helper: Option<Helper>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency token, bumped by the repository on every update.
    pub version: u64,
}

impl Demand {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_points_reward(&self) -> bool {
        self.reward_type == RewardType::Points && self.reward_value > 0
    }

    /// Helper presence must track the status exactly.
    pub fn helper_invariant_holds(&self) -> bool {
        self.helper.is_some() == self.status.has_helper()
    }

    pub fn helper_id(&self) -> Option<&UserId> {
        self.helper.as_ref().map(|helper| &helper.id)
    }
}
