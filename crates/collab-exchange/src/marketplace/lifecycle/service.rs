use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{error, info, warn};

use super::{GuardFailure, LifecycleCommand, LifecycleError};
use crate::marketplace::clock::Clock;
use crate::marketplace::domain::{
    Actor, Comment, Demand, DemandDraft, DemandId, DemandRevision, DemandStatus, Helper, Role,
    RewardType, UserId,
};
use crate::marketplace::ledger::{LedgerReason, Operator, PointsLedger};
use crate::marketplace::locks::KeyedLocks;
use crate::marketplace::notifications::{Audience, DomainEvent, EventSink, Notification};
use crate::marketplace::repository::{DemandRepository, MemberRepository};

/// Drives demands through their status machine and moves escrowed points with them.
///
/// Commands on one demand are serialized; commands on different demands run in parallel.
/// A transition and its ledger movement either both take effect or neither does. Reads
/// go through the same per-demand cell, and ledger notifications for a transition are
/// published only after the demand is stored, so nobody observes one half of the pair.
pub struct DemandLifecycle {
    demands: Arc<dyn DemandRepository>,
    members: Arc<dyn MemberRepository>,
    ledger: Arc<PointsLedger>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<DemandId>,
    next_id: AtomicU64,
}

impl DemandLifecycle {
    pub fn new(
        demands: Arc<dyn DemandRepository>,
        members: Arc<dyn MemberRepository>,
        ledger: Arc<PointsLedger>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            demands,
            members,
            ledger,
            events,
            clock,
            locks: KeyedLocks::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a demand directly in `Published`, withholding a points reward from the
    /// creator. If the withholding is refused nothing is stored.
    pub fn publish(&self, creator: &Actor, draft: DemandDraft) -> Result<Demand, LifecycleError> {
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            return Err(LifecycleError::InvalidInput("demand title must not be empty"));
        }
        self.require_member(&creator.user_id)?;

        let id = DemandId(format!(
            "dm-{:06}",
            self.next_id.fetch_add(1, Ordering::Relaxed)
        ));

        let (stored, escrow) = self.locks.with(&id, || -> Result<_, LifecycleError> {
            let escrow = match draft.reward_type {
                RewardType::Points if draft.reward_value > 0 => Some(self.ledger.debit_held(
                    &creator.user_id,
                    draft.reward_value,
                    LedgerReason::EscrowDebit,
                    Operator::System,
                )?),
                RewardType::Points | RewardType::Amount => None,
            };
            let escrowed = escrow
                .as_ref()
                .map_or(0, |held| held.receipt().change_amount.unsigned_abs());

            let demand = Demand {
                id: id.clone(),
                title,
                description: draft.description,
                customer_info: draft.customer_info,
                tags: draft.tags,
                urgency: draft.urgency,
                reward_type: draft.reward_type,
                reward_value: draft.reward_value,
                escrowed,
                is_recommended: false,
                status: DemandStatus::Published,
                creator_id: creator.user_id.clone(),
                creator_name: creator.display_name.clone(),
                helper: None,
                comments: Vec::new(),
                created_at: self.clock.now(),
                accepted_at: None,
                completed_at: None,
                deleted_at: None,
                version: 0,
            };

            match self.demands.insert(demand) {
                Ok(stored) => Ok((stored, escrow)),
                Err(failure) => {
                    if let Some(held) = escrow {
                        self.ledger.announce(held);
                        self.refund(&creator.user_id, escrowed, &id);
                    }
                    Err(LifecycleError::storage(&id, failure))
                }
            }
        })?;

        if let Some(held) = escrow {
            self.ledger.announce(held);
        }

        info!(
            demand = %stored.id,
            to = %stored.status,
            actor = %stored.creator_id,
            reward = stored.reward_value,
            escrowed = stored.escrowed,
            "demand published"
        );

        let event = DomainEvent::DemandPublished {
            demand_id: stored.id.clone(),
            title: stored.title.clone(),
            creator_id: stored.creator_id.clone(),
            creator_name: stored.creator_name.clone(),
            reward_type: stored.reward_type,
            reward_value: stored.reward_value,
        };
        self.emit(event.clone(), Audience::user(stored.creator_id.clone()));
        self.emit(event, Audience::role(Role::Employee));

        Ok(stored)
    }

    /// Claim a published demand. Exactly one of several concurrent claims succeeds.
    pub fn accept(&self, id: &DemandId, helper: &Actor) -> Result<Demand, LifecycleError> {
        self.require_member(&helper.user_id)?;

        let accepted = self.locks.with(id, || {
            let mut demand = self.load(id)?;
            if demand.status != DemandStatus::Published {
                return Err(reject(
                    &demand,
                    LifecycleCommand::Accept,
                    GuardFailure::StatusNotAllowed,
                ));
            }
            if demand.creator_id == helper.user_id {
                return Err(reject(&demand, LifecycleCommand::Accept, GuardFailure::SelfAcceptance));
            }

            demand.status = DemandStatus::Accepted;
            demand.helper = Some(Helper {
                id: helper.user_id.clone(),
                name: helper.display_name.clone(),
            });
            demand.accepted_at = Some(self.clock.now());
            self.save(demand)
        })?;

        info!(
            demand = %accepted.id,
            from = %DemandStatus::Published,
            to = %accepted.status,
            actor = %helper.user_id,
            "demand accepted"
        );
        self.emit(
            DomainEvent::DemandAccepted {
                demand_id: accepted.id.clone(),
                title: accepted.title.clone(),
                helper_id: helper.user_id.clone(),
                helper_name: helper.display_name.clone(),
            },
            Audience::user(accepted.creator_id.clone()),
        );
        Ok(accepted)
    }

    /// Close out an accepted demand and pay the full reward to the helper. A failed
    /// payout restores the demand to `Accepted`.
    pub fn complete(&self, id: &DemandId, caller: &Actor) -> Result<Demand, LifecycleError> {
        let (completed, helper, payout) = self.locks.with(id, || -> Result<_, LifecycleError> {
            let demand = self.load(id)?;
            if demand.status != DemandStatus::Accepted {
                return Err(reject(
                    &demand,
                    LifecycleCommand::Complete,
                    GuardFailure::StatusNotAllowed,
                ));
            }
            if demand.creator_id != caller.user_id && !caller.is_admin() {
                return Err(reject(&demand, LifecycleCommand::Complete, GuardFailure::NotCreator));
            }
            let Some(helper) = demand.helper.clone() else {
                return Err(reject(
                    &demand,
                    LifecycleCommand::Complete,
                    GuardFailure::MissingHelper,
                ));
            };

            let previous = demand.clone();
            let mut next = demand;
            next.status = DemandStatus::Completed;
            next.completed_at = Some(self.clock.now());
            let committed = self.save(next)?;
            if !committed.is_points_reward() {
                return Ok((committed, helper, None));
            }

            match self.ledger.credit_held(
                &helper.id,
                committed.reward_value,
                LedgerReason::SettlementCredit,
                Operator::System,
            ) {
                Ok(held) => Ok((committed, helper, Some(held))),
                Err(failure) => {
                    let mut restored = previous;
                    restored.version = committed.version;
                    if let Err(rollback) = self.demands.update(restored) {
                        error!(
                            demand = %committed.id,
                            error = %rollback,
                            "failed to restore demand after settlement failure"
                        );
                    }
                    Err(failure.into())
                }
            }
        })?;

        if let Some(held) = payout {
            self.ledger.announce(held);
        }

        info!(
            demand = %completed.id,
            from = %DemandStatus::Accepted,
            to = %completed.status,
            actor = %caller.user_id,
            helper = %helper.id,
            reward = completed.reward_value,
            "demand completed"
        );
        let event = DomainEvent::DemandCompleted {
            demand_id: completed.id.clone(),
            title: completed.title.clone(),
            creator_name: completed.creator_name.clone(),
            helper_name: helper.name.clone(),
            reward_type: completed.reward_type,
            reward_value: completed.reward_value,
        };
        self.emit(event.clone(), Audience::user(helper.id.clone()));
        self.emit(event, Audience::user(completed.creator_id.clone()));
        Ok(completed)
    }

    /// Set or clear the recommendation flag. Only a false-to-true change notifies.
    pub fn recommend(
        &self,
        id: &DemandId,
        caller: &Actor,
        recommended: bool,
    ) -> Result<Demand, LifecycleError> {
        let (demand, changed) = self.locks.with(id, || {
            let mut demand = self.load(id)?;
            if !matches!(demand.status, DemandStatus::Published | DemandStatus::Accepted) {
                return Err(reject(
                    &demand,
                    LifecycleCommand::Recommend,
                    GuardFailure::StatusNotAllowed,
                ));
            }
            if !caller.role.is_management() {
                return Err(reject(
                    &demand,
                    LifecycleCommand::Recommend,
                    GuardFailure::RoleNotPermitted(caller.role),
                ));
            }
            if demand.is_recommended == recommended {
                return Ok((demand, false));
            }

            demand.is_recommended = recommended;
            Ok((self.save(demand)?, true))
        })?;
        if !changed {
            return Ok(demand);
        }

        info!(demand = %demand.id, recommended, by = %caller.user_id, "recommendation changed");
        if recommended {
            self.emit(
                DomainEvent::DemandRecommended {
                    demand_id: demand.id.clone(),
                    title: demand.title.clone(),
                },
                Audience::user(demand.creator_id.clone()),
            );
        }
        Ok(demand)
    }

    /// Edit the descriptive fields of a published demand. Reward terms cannot change.
    pub fn revise(
        &self,
        id: &DemandId,
        caller: &Actor,
        revision: DemandRevision,
    ) -> Result<Demand, LifecycleError> {
        let revised = self.locks.with(id, || self.apply_revision(id, caller, revision))?;
        info!(demand = %revised.id, "demand revised");
        Ok(revised)
    }

    fn apply_revision(
        &self,
        id: &DemandId,
        caller: &Actor,
        revision: DemandRevision,
    ) -> Result<Demand, LifecycleError> {
        let mut demand = self.load(id)?;
        if demand.status != DemandStatus::Published {
            return Err(reject(&demand, LifecycleCommand::Revise, GuardFailure::StatusNotAllowed));
        }
        if demand.creator_id != caller.user_id {
            return Err(reject(&demand, LifecycleCommand::Revise, GuardFailure::NotCreator));
        }

        if let Some(title) = revision.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(LifecycleError::InvalidInput("demand title must not be empty"));
            }
            demand.title = title;
        }
        if let Some(description) = revision.description {
            demand.description = description;
        }
        if let Some(customer_info) = revision.customer_info {
            demand.customer_info = customer_info;
        }
        if let Some(tags) = revision.tags {
            demand.tags = tags;
        }
        if let Some(urgency) = revision.urgency {
            demand.urgency = urgency;
        }

        self.save(demand)
    }

    /// Logically delete a non-terminal demand. Escrowed points stay withheld.
    pub fn delete(&self, id: &DemandId, caller: &Actor) -> Result<Demand, LifecycleError> {
        let deleted = self.locks.with(id, || {
            let mut demand = self.load(id)?;
            if demand.status.is_terminal() {
                return Err(reject(&demand, LifecycleCommand::Delete, GuardFailure::Terminal));
            }
            if demand.creator_id != caller.user_id && !caller.is_admin() {
                return Err(reject(&demand, LifecycleCommand::Delete, GuardFailure::NotCreator));
            }

            demand.deleted_at = Some(self.clock.now());
            self.save(demand)
        })?;
        if deleted.escrowed > 0 {
            warn!(
                demand = %deleted.id,
                creator = %deleted.creator_id,
                escrowed = deleted.escrowed,
                "demand deleted; escrowed points are not returned"
            );
        }
        info!(demand = %deleted.id, by = %caller.user_id, "demand deleted");
        Ok(deleted)
    }

    pub fn comment(
        &self,
        id: &DemandId,
        author: &Actor,
        body: &str,
    ) -> Result<Demand, LifecycleError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(LifecycleError::InvalidInput("comment body must not be empty"));
        }

        let demand = self.locks.with(id, || {
            let mut demand = self.load(id)?;
            demand.comments.push(Comment {
                author_id: author.user_id.clone(),
                author_name: author.display_name.clone(),
                body: body.to_string(),
                created_at: self.clock.now(),
            });
            self.save(demand)
        })?;

        let event = DomainEvent::CommentAdded {
            demand_id: demand.id.clone(),
            title: demand.title.clone(),
            author_name: author.display_name.clone(),
        };
        let mut recipients: Vec<&UserId> = vec![&demand.creator_id];
        if let Some(helper) = demand.helper_id() {
            if *helper != demand.creator_id {
                recipients.push(helper);
            }
        }
        for recipient in recipients.into_iter().filter(|id| **id != author.user_id) {
            self.emit(event.clone(), Audience::user(recipient.clone()));
        }
        Ok(demand)
    }

    pub fn get(&self, id: &DemandId) -> Result<Demand, LifecycleError> {
        self.locks.with(id, || self.load(id))
    }

    /// Live demands, oldest first.
    pub fn list(&self) -> Result<Vec<Demand>, LifecycleError> {
        let mut demands = Vec::new();
        for listed in self.demands.list().map_err(LifecycleError::Repository)? {
            // Re-read under the demand's cell so a command in flight is seen whole.
            let current = self
                .locks
                .with(&listed.id, || self.demands.fetch(&listed.id))
                .map_err(LifecycleError::Repository)?;
            if let Some(demand) = current.filter(|demand| !demand.is_deleted()) {
                demands.push(demand);
            }
        }
        demands.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(demands)
    }

    /// Points withheld for live, unsettled demands.
    pub fn outstanding_escrow(&self) -> Result<u64, LifecycleError> {
        Ok(self
            .list()?
            .iter()
            .filter(|demand| demand.reward_type == RewardType::Points)
            .filter(|demand| {
                matches!(
                    demand.status,
                    DemandStatus::Published | DemandStatus::Accepted
                )
            })
            .map(|demand| demand.escrowed)
            .sum())
    }

    fn load(&self, id: &DemandId) -> Result<Demand, LifecycleError> {
        match self.demands.fetch(id) {
            Ok(Some(demand)) if !demand.is_deleted() => Ok(demand),
            Ok(_) => Err(LifecycleError::NotFound(id.clone())),
            Err(error) => Err(LifecycleError::storage(id, error)),
        }
    }

    fn save(&self, demand: Demand) -> Result<Demand, LifecycleError> {
        let id = demand.id.clone();
        self.demands
            .update(demand)
            .map_err(|error| LifecycleError::storage(&id, error))
    }

    fn require_member(&self, user: &UserId) -> Result<(), LifecycleError> {
        match self.members.fetch(user) {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(LifecycleError::UnknownMember(user.clone())),
            Err(error) => Err(LifecycleError::Repository(error)),
        }
    }

    fn refund(&self, creator: &UserId, amount: u64, id: &DemandId) {
        if amount == 0 {
            return;
        }
        if let Err(error) =
            self.ledger
                .credit(creator, amount, LedgerReason::EscrowRefund, Operator::System)
        {
            error!(demand = %id, creator = %creator, amount, %error, "failed to refund escrow");
        }
    }

    fn emit(&self, event: DomainEvent, audience: Audience) {
        self.events
            .publish(Notification::new(event, audience, self.clock.now()));
    }
}

fn reject(demand: &Demand, command: LifecycleCommand, reason: GuardFailure) -> LifecycleError {
    LifecycleError::InvalidTransition {
        demand_id: demand.id.clone(),
        current: demand.status,
        command,
        reason,
    }
}
