use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{
    EscrowPolicy, HistoryScope, LedgerError, LedgerReason, LedgerReceipt, LedgerTransaction,
    Operator, TransactionId,
};
use crate::marketplace::clock::Clock;
use crate::marketplace::domain::{Actor, UserId};
use crate::marketplace::locks::KeyedLocks;
use crate::marketplace::notifications::{Audience, DomainEvent, EventSink, Notification};
use crate::marketplace::repository::{LedgerRepository, MemberRepository, RepositoryError};

/// Sole writer of member balances.
///
/// Every mutation reads the member's latest entry and appends the next one while holding
/// that member's serialization cell, so two debits can never both observe the same
/// balance. Members are independent of each other.
pub struct PointsLedger {
    members: Arc<dyn MemberRepository>,
    entries: Arc<dyn LedgerRepository>,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    policy: EscrowPolicy,
    locks: KeyedLocks<UserId>,
}

/// An appended entry whose `BalanceChanged` notification is held back until the caller's
/// own write has been committed. Hand it to [`PointsLedger::announce`].
#[must_use = "announce the entry once the surrounding write is committed"]
#[derive(Debug)]
pub struct HeldEntry {
    receipt: LedgerReceipt,
    notification: Notification,
}

impl HeldEntry {
    pub fn receipt(&self) -> &LedgerReceipt {
        &self.receipt
    }
}

#[derive(Debug, Clone, Copy)]
enum Movement {
    Debit(u64),
    Credit(u64),
    Adjust(i64),
}

impl PointsLedger {
    pub fn new(
        members: Arc<dyn MemberRepository>,
        entries: Arc<dyn LedgerRepository>,
        events: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        policy: EscrowPolicy,
    ) -> Self {
        Self {
            members,
            entries,
            events,
            clock,
            policy,
            locks: KeyedLocks::new(),
        }
    }

    /// Withhold `amount` from `user`. Under [`EscrowPolicy::ClampAtZero`] the balance
    /// floors at zero and the unmet remainder is recorded as the entry's shortfall. A
    /// debit against an empty balance still appends an entry: its `change_amount` is 0
    /// and the whole amount is the shortfall.
    pub fn debit(
        &self,
        user: &UserId,
        amount: u64,
        reason: LedgerReason,
        operator: Operator,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.debit_held(user, amount, reason, operator)
            .map(|held| self.announce(held))
    }

    pub fn credit(
        &self,
        user: &UserId,
        amount: u64,
        reason: LedgerReason,
        operator: Operator,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.credit_held(user, amount, reason, operator)
            .map(|held| self.announce(held))
    }

    /// [`PointsLedger::debit`] without the notification; see [`HeldEntry`].
    pub fn debit_held(
        &self,
        user: &UserId,
        amount: u64,
        reason: LedgerReason,
        operator: Operator,
    ) -> Result<HeldEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.post(user, Movement::Debit(amount), reason, operator)
    }

    /// [`PointsLedger::credit`] without the notification; see [`HeldEntry`].
    pub fn credit_held(
        &self,
        user: &UserId,
        amount: u64,
        reason: LedgerReason,
        operator: Operator,
    ) -> Result<HeldEntry, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        self.post(user, Movement::Credit(amount), reason, operator)
    }

    /// Publish the `BalanceChanged` notification of a held entry.
    pub fn announce(&self, held: HeldEntry) -> LedgerReceipt {
        self.events.publish(held.notification);
        held.receipt
    }

    /// Administrative correction. Negative deltas never clamp.
    pub fn adjust(
        &self,
        user: &UserId,
        delta: i64,
        reason: LedgerReason,
        operator: &Actor,
    ) -> Result<LedgerReceipt, LedgerError> {
        if !operator.is_admin() {
            return Err(LedgerError::Forbidden {
                caller: operator.user_id.clone(),
                action: "adjust point balances",
            });
        }
        if delta == 0 {
            return Err(LedgerError::ZeroAdjustment);
        }
        self.post(
            user,
            Movement::Adjust(delta),
            reason,
            Operator::Admin(operator.user_id.clone()),
        )
        .map(|held| self.announce(held))
    }

    pub fn balance_of(&self, user: &UserId) -> Result<u64, LedgerError> {
        if let Some(entry) = self.entries.latest(user)? {
            return Ok(entry.balance_after);
        }
        self.members
            .fetch(user)?
            .map(|member| member.opening_points)
            .ok_or_else(|| LedgerError::UnknownMember(user.clone()))
    }

    /// Ledger entries in creation order. Only administrators may read other members'
    /// entries; a non-admin asking for the full log receives their own history.
    pub fn history(
        &self,
        scope: &HistoryScope,
        caller: &Actor,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        let target = match scope {
            HistoryScope::All if caller.is_admin() => None,
            HistoryScope::All => Some(&caller.user_id),
            HistoryScope::Member(user) if caller.is_admin() || *user == caller.user_id => {
                Some(user)
            }
            HistoryScope::Member(_) => {
                return Err(LedgerError::Forbidden {
                    caller: caller.user_id.clone(),
                    action: "read another member's ledger",
                })
            }
        };
        Ok(self.entries.history(target)?)
    }

    /// Sum of every registered member's balance.
    pub fn total_balance(&self) -> Result<u64, LedgerError> {
        let mut total = 0u64;
        for member in self.members.list()? {
            total = total.saturating_add(self.balance_of(&member.id)?);
        }
        Ok(total)
    }

    fn post(
        &self,
        user: &UserId,
        movement: Movement,
        reason: LedgerReason,
        operator: Operator,
    ) -> Result<HeldEntry, LedgerError> {
        let entry = self.locks.with(user, || -> Result<_, LedgerError> {
            let member = self
                .members
                .fetch(user)?
                .ok_or_else(|| LedgerError::UnknownMember(user.clone()))?;
            let latest = self.entries.latest(user)?;
            let (balance, sequence) = match &latest {
                Some(entry) => (entry.balance_after, entry.sequence + 1),
                None => (member.opening_points, 1),
            };

            let (change_amount, balance_after, shortfall) = self.settle(user, balance, movement)?;
            let entry = LedgerTransaction {
                id: TransactionId(format!("tx-{user}-{sequence:06}")),
                user_id: user.clone(),
                sequence,
                change_amount,
                balance_after,
                shortfall,
                reason,
                operator,
                created_at: self.clock.now(),
            };

            self.entries
                .append(entry.clone())
                .map_err(|error| match error {
                    RepositoryError::Conflict => LedgerError::ConcurrentModification(user.clone()),
                    other => LedgerError::Repository(other),
                })?;

            // The log is authoritative; a stale cached balance is repaired by the next write.
            if let Err(error) = self.members.store_points(user, balance_after) {
                warn!(user = %user, %error, "failed to refresh cached member balance");
            }
            Ok(entry)
        })?;

        info!(
            user = %entry.user_id,
            transaction = %entry.id,
            change = entry.change_amount,
            balance_after = entry.balance_after,
            shortfall = entry.shortfall,
            reason = entry.reason.label(),
            operator = %entry.operator,
            "ledger entry appended"
        );
        if entry.shortfall > 0 {
            warn!(
                user = %entry.user_id,
                shortfall = entry.shortfall,
                "debit clamped at zero balance"
            );
        }

        let notification = Notification::new(
            DomainEvent::BalanceChanged {
                user_id: entry.user_id.clone(),
                change_amount: entry.change_amount,
                balance_after: entry.balance_after,
                reason: entry.reason,
            },
            Audience::user(entry.user_id.clone()),
            entry.created_at,
        );

        Ok(HeldEntry {
            receipt: LedgerReceipt::from(&entry),
            notification,
        })
    }

    /// Returns `(change_amount, balance_after, shortfall)`.
    fn settle(
        &self,
        user: &UserId,
        balance: u64,
        movement: Movement,
    ) -> Result<(i64, u64, u64), LedgerError> {
        match movement {
            Movement::Debit(amount) => {
                if amount > balance && self.policy == EscrowPolicy::StrictRefusal {
                    return Err(LedgerError::InsufficientFunds {
                        user: user.clone(),
                        balance,
                        requested: amount,
                    });
                }
                let applied = amount.min(balance);
                Ok((-signed(applied)?, balance - applied, amount - applied))
            }
            Movement::Credit(amount) => {
                let after = balance
                    .checked_add(amount)
                    .ok_or(LedgerError::OutOfRange(amount))?;
                Ok((signed(amount)?, after, 0))
            }
            Movement::Adjust(delta) if delta > 0 => {
                let amount = delta.unsigned_abs();
                let after = balance
                    .checked_add(amount)
                    .ok_or(LedgerError::OutOfRange(amount))?;
                Ok((delta, after, 0))
            }
            Movement::Adjust(delta) => {
                let amount = delta.unsigned_abs();
                if amount > balance {
                    return Err(LedgerError::InsufficientFunds {
                        user: user.clone(),
                        balance,
                        requested: amount,
                    });
                }
                Ok((delta, balance - amount, 0))
            }
        }
    }
}

fn signed(amount: u64) -> Result<i64, LedgerError> {
    i64::try_from(amount).map_err(|_| LedgerError::OutOfRange(amount))
}
