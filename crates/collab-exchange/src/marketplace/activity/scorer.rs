use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use serde::Serialize;
use tracing::debug;

use super::calendar::{local_date, WeekWindow};
use super::{ActivityError, ActivityRecord, DAILY_ACTIVITY_CAP};
use crate::marketplace::clock::Clock;
use crate::marketplace::domain::{Role, UserId};
use crate::marketplace::locks::KeyedLocks;
use crate::marketplace::repository::{ActivityRepository, MemberRepository};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
    pub active_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Leaderboard {
    pub window: WeekWindow,
    pub role: Role,
    pub top: Vec<LeaderboardEntry>,
    pub bottom: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
    pub date: NaiveDate,
    pub daily_active_users: usize,
    pub week: WeekWindow,
    pub weekly_active_users: usize,
}

/// Converts member actions into a capped per-day engagement count.
pub struct ActivityScorer {
    records: Arc<dyn ActivityRepository>,
    members: Arc<dyn MemberRepository>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
    locks: KeyedLocks<(UserId, NaiveDate)>,
}

impl ActivityScorer {
    pub fn new(
        records: Arc<dyn ActivityRepository>,
        members: Arc<dyn MemberRepository>,
        clock: Arc<dyn Clock>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            records,
            members,
            clock,
            offset,
            locks: KeyedLocks::new(),
        }
    }

    /// Count one action for `user` on `date`, returning the day's count afterwards.
    pub fn record_activity(&self, user: &UserId, date: NaiveDate) -> Result<u8, ActivityError> {
        self.locks.with(&(user.clone(), date), || self.bump(user, date))
    }

    fn bump(&self, user: &UserId, date: NaiveDate) -> Result<u8, ActivityError> {
        let record = match self.records.fetch(user, date)? {
            Some(existing) if existing.count >= DAILY_ACTIVITY_CAP => {
                debug!(user = %user, %date, "daily activity cap reached");
                return Ok(DAILY_ACTIVITY_CAP);
            }
            Some(mut existing) => {
                existing.count += 1;
                existing.last_active_at = self.clock.now();
                existing
            }
            None => ActivityRecord {
                user_id: user.clone(),
                date,
                count: 1,
                last_active_at: self.clock.now(),
            },
        };

        self.records.upsert(record.clone())?;
        Ok(record.count)
    }

    /// Count one action on today's date in the deployment timezone.
    pub fn record_now(&self, user: &UserId) -> Result<u8, ActivityError> {
        self.record_activity(user, self.today())
    }

    pub fn today(&self) -> NaiveDate {
        local_date(self.clock.now(), self.offset)
    }

    pub fn current_week(&self) -> WeekWindow {
        WeekWindow::containing(self.clock.now(), self.offset)
    }

    pub fn daily_active_users(&self, date: NaiveDate) -> Result<usize, ActivityError> {
        self.active_users(WeekWindow::new(date, date)?)
    }

    pub fn weekly_active_users(&self, window: WeekWindow) -> Result<usize, ActivityError> {
        self.active_users(window)
    }

    pub fn weekly_score(&self, user: &UserId, window: WeekWindow) -> Result<u32, ActivityError> {
        Ok(self
            .records
            .between(window.start, window.end)?
            .iter()
            .filter(|record| record.user_id == *user)
            .map(|record| u32::from(record.count))
            .sum())
    }

    /// Top and bottom `limit` members of `role` by weekly score. Members without any
    /// activity in the window are not ranked; ties resolve by ascending user id.
    /// Management roles are never ranked.
    pub fn leaderboard(
        &self,
        window: WeekWindow,
        role: Role,
        limit: usize,
    ) -> Result<Leaderboard, ActivityError> {
        if role.is_management() {
            return Err(ActivityError::UnrankedRole(role));
        }

        let mut totals: BTreeMap<UserId, (u32, u32)> = BTreeMap::new();
        for record in self.records.between(window.start, window.end)? {
            let entry = totals.entry(record.user_id).or_default();
            entry.0 = entry.0.saturating_add(u32::from(record.count));
            entry.1 = entry.1.saturating_add(1);
        }

        let names: HashMap<UserId, String> = self
            .members
            .list()?
            .into_iter()
            .filter(|member| member.role == role)
            .map(|member| (member.id, member.display_name))
            .collect();

        let ranked: Vec<LeaderboardEntry> = totals
            .into_iter()
            .filter_map(|(user_id, (score, active_days))| {
                names.get(&user_id).map(|name| LeaderboardEntry {
                    display_name: name.clone(),
                    user_id,
                    score,
                    active_days,
                })
            })
            .collect();

        let mut top = ranked.clone();
        top.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.user_id.cmp(&b.user_id)));
        top.truncate(limit);

        let mut bottom = ranked;
        bottom.sort_by(|a, b| a.score.cmp(&b.score).then_with(|| a.user_id.cmp(&b.user_id)));
        bottom.truncate(limit);

        Ok(Leaderboard {
            window,
            role,
            top,
            bottom,
        })
    }

    pub fn summary(&self, date: NaiveDate) -> Result<ActivitySummary, ActivityError> {
        let week = WeekWindow::of_date(date);
        Ok(ActivitySummary {
            date,
            daily_active_users: self.daily_active_users(date)?,
            week,
            weekly_active_users: self.weekly_active_users(week)?,
        })
    }

    fn active_users(&self, window: WeekWindow) -> Result<usize, ActivityError> {
        let users: BTreeSet<UserId> = self
            .records
            .between(window.start, window.end)?
            .into_iter()
            .filter(|record| record.count > 0)
            .map(|record| record.user_id)
            .collect();
        Ok(users.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::clock::ManualClock;
    use crate::marketplace::memory::{InMemoryActivity, InMemoryMembers};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn serialization_cells_do_not_accumulate_across_days() {
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0)
                .single()
                .expect("valid instant"),
        );
        let scorer = ActivityScorer::new(
            Arc::new(InMemoryActivity::default()),
            Arc::new(InMemoryMembers::default()),
            Arc::new(clock),
            FixedOffset::east_opt(0).expect("utc offset"),
        );
        let first = NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date");

        for offset in 0..400 {
            for user in ["alice", "bob"] {
                scorer
                    .record_activity(&UserId::new(user), first + Duration::days(offset))
                    .expect("record");
            }
        }

        assert!(scorer.locks.is_empty());
    }
}
