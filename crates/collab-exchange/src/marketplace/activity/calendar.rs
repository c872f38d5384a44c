use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;

use super::ActivityError;

/// Inclusive calendar-date range, Monday through Sunday for weekly windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeekWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl WeekWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ActivityError> {
        if start > end {
            return Err(ActivityError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// The Monday-to-Sunday week containing `now` in the deployment timezone.
    /// Pure in its inputs, so repeated queries for the same instant agree.
    pub fn containing(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::of_date(local_date(now, offset))
    }

    /// The Monday-to-Sunday week a calendar date belongs to.
    pub fn of_date(date: NaiveDate) -> Self {
        let start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        Self {
            start,
            end: start + Duration::days(6),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// First instant of the window (00:00:00 on `start`).
    pub fn starts_at(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        at_local(self.start.and_time(NaiveTime::MIN), offset)
    }

    /// Last whole second of the window (23:59:59 on `end`).
    pub fn ends_at(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        let next_midnight = (self.end + Duration::days(1)).and_time(NaiveTime::MIN);
        at_local(next_midnight - Duration::seconds(1), offset)
    }
}

/// Calendar date of `now` in the deployment timezone.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

fn at_local(local: chrono::NaiveDateTime, offset: FixedOffset) -> DateTime<FixedOffset> {
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike, Weekday};

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).expect("valid offset")
    }

    #[test]
    fn week_runs_monday_through_sunday() {
        // Wednesday 2025-10-15 12:00 UTC
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap();
        let window = WeekWindow::containing(now, offset(0));
        assert_eq!(window.start, NaiveDate::from_ymd_opt(2025, 10, 13).unwrap());
        assert_eq!(window.end, NaiveDate::from_ymd_opt(2025, 10, 19).unwrap());
        assert_eq!(window.start.weekday(), Weekday::Mon);
        assert_eq!(window.end.weekday(), Weekday::Sun);
    }

    #[test]
    fn timezone_moves_the_boundary() {
        // Sunday 2025-10-19 20:00 UTC is already Monday in UTC+8.
        let now = Utc.with_ymd_and_hms(2025, 10, 19, 20, 0, 0).unwrap();
        let utc = WeekWindow::containing(now, offset(0));
        let shanghai = WeekWindow::containing(now, offset(8));
        assert_eq!(utc.start, NaiveDate::from_ymd_opt(2025, 10, 13).unwrap());
        assert_eq!(shanghai.start, NaiveDate::from_ymd_opt(2025, 10, 20).unwrap());
    }

    #[test]
    fn boundaries_are_midnight_and_last_second() {
        let now = Utc.with_ymd_and_hms(2025, 10, 15, 12, 0, 0).unwrap();
        let window = WeekWindow::containing(now, offset(8));
        let starts = window.starts_at(offset(8));
        let ends = window.ends_at(offset(8));
        assert_eq!(starts.date_naive(), window.start);
        assert_eq!((starts.hour(), starts.minute(), starts.second()), (0, 0, 0));
        assert_eq!(ends.date_naive(), window.end);
        assert_eq!((ends.hour(), ends.minute(), ends.second()), (23, 59, 59));
    }

    #[test]
    fn rejects_inverted_ranges() {
        let start = NaiveDate::from_ymd_opt(2025, 10, 19).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 10, 13).unwrap();
        assert!(matches!(
            WeekWindow::new(start, end),
            Err(ActivityError::InvertedRange { .. })
        ));
    }
}
