//! Process-local repository implementations used by the demo service and the tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use super::activity::ActivityRecord;
use super::domain::{Demand, DemandId, Member, UserId};
use super::ledger::LedgerTransaction;
use super::repository::{
    ActivityRepository, DemandRepository, LedgerRepository, MemberRepository, RepositoryError,
};

fn acquire<'a, T>(mutex: &'a Mutex<T>, store: &str) -> Result<MutexGuard<'a, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable(format!("{store} mutex poisoned")))
}

#[derive(Default, Clone)]
pub struct InMemoryMembers {
    records: Arc<Mutex<BTreeMap<UserId, Member>>>,
}

impl MemberRepository for InMemoryMembers {
    fn insert(&self, member: Member) -> Result<Member, RepositoryError> {
        let mut guard = acquire(&self.records, "member")?;
        if guard.contains_key(&member.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(member.id.clone(), member.clone());
        Ok(member)
    }

    fn fetch(&self, id: &UserId) -> Result<Option<Member>, RepositoryError> {
        let guard = acquire(&self.records, "member")?;
        Ok(guard.get(id).cloned())
    }

    fn store_points(&self, id: &UserId, points: u64) -> Result<(), RepositoryError> {
        let mut guard = acquire(&self.records, "member")?;
        let member = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        member.points = points;
        Ok(())
    }

    fn list(&self) -> Result<Vec<Member>, RepositoryError> {
        let guard = acquire(&self.records, "member")?;
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryLedger {
    entries: Arc<Mutex<Vec<LedgerTransaction>>>,
}

impl LedgerRepository for InMemoryLedger {
    fn append(&self, entry: LedgerTransaction) -> Result<(), RepositoryError> {
        let mut guard = acquire(&self.entries, "ledger")?;
        let latest = guard
            .iter()
            .rev()
            .find(|existing| existing.user_id == entry.user_id)
            .map_or(0, |existing| existing.sequence);
        if entry.sequence != latest + 1 {
            return Err(RepositoryError::Conflict);
        }
        guard.push(entry);
        Ok(())
    }

    fn latest(&self, user: &UserId) -> Result<Option<LedgerTransaction>, RepositoryError> {
        let guard = acquire(&self.entries, "ledger")?;
        Ok(guard.iter().rev().find(|entry| entry.user_id == *user).cloned())
    }

    fn history(&self, user: Option<&UserId>) -> Result<Vec<LedgerTransaction>, RepositoryError> {
        let guard = acquire(&self.entries, "ledger")?;
        Ok(guard
            .iter()
            .filter(|entry| user.map_or(true, |id| entry.user_id == *id))
            .cloned()
            .collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryDemands {
    records: Arc<Mutex<HashMap<DemandId, Demand>>>,
}

impl DemandRepository for InMemoryDemands {
    fn insert(&self, demand: Demand) -> Result<Demand, RepositoryError> {
        let mut guard = acquire(&self.records, "demand")?;
        if guard.contains_key(&demand.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(demand.id.clone(), demand.clone());
        Ok(demand)
    }

    fn fetch(&self, id: &DemandId) -> Result<Option<Demand>, RepositoryError> {
        let guard = acquire(&self.records, "demand")?;
        Ok(guard.get(id).cloned())
    }

    fn update(&self, mut demand: Demand) -> Result<Demand, RepositoryError> {
        let mut guard = acquire(&self.records, "demand")?;
        let stored = guard.get_mut(&demand.id).ok_or(RepositoryError::NotFound)?;
        if stored.version != demand.version {
            return Err(RepositoryError::Conflict);
        }
        demand.version += 1;
        *stored = demand.clone();
        Ok(demand)
    }

    fn list(&self) -> Result<Vec<Demand>, RepositoryError> {
        let guard = acquire(&self.records, "demand")?;
        Ok(guard.values().cloned().collect())
    }
}

#[derive(Default, Clone)]
pub struct InMemoryActivity {
    records: Arc<Mutex<BTreeMap<(NaiveDate, UserId), ActivityRecord>>>,
}

impl ActivityRepository for InMemoryActivity {
    fn fetch(
        &self,
        user: &UserId,
        date: NaiveDate,
    ) -> Result<Option<ActivityRecord>, RepositoryError> {
        let guard = acquire(&self.records, "activity")?;
        Ok(guard.get(&(date, user.clone())).cloned())
    }

    fn upsert(&self, record: ActivityRecord) -> Result<(), RepositoryError> {
        let mut guard = acquire(&self.records, "activity")?;
        guard.insert((record.date, record.user_id.clone()), record);
        Ok(())
    }

    fn between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActivityRecord>, RepositoryError> {
        if start > end {
            return Ok(Vec::new());
        }
        let guard = acquire(&self.records, "activity")?;
        Ok(guard
            .iter()
            .filter(|((date, _), _)| *date >= start && *date <= end)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
