//! The moving date window a fetcher filters its feed with.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// `[start, start + days)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: DateTime<Utc>,
    pub days: u32,
}

impl DateWindow {
    pub fn new(start: DateTime<Utc>, days: u32) -> Self {
        DateWindow { start, days }
    }

    /// Saturates at the latest representable instant.
    pub fn end(&self) -> DateTime<Utc> {
        self.start
            .checked_add_signed(Duration::days(i64::from(self.days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Keep an event unless it ended before the window opened or starts at/after
    /// the window closes.
    pub fn retains(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        end >= self.start && start < self.end()
    }

    /// Move the window start forward. Earlier starts are ignored so the window
    /// never slides backwards. Returns whether the window changed.
    pub fn advance_to(&mut self, new_start: DateTime<Utc>) -> bool {
        if new_start > self.start {
            self.start = new_start;
            true
        } else {
            false
        }
    }
}

/// Midnight of `date` in `tz`, as an instant.
///
/// Falls back to UTC midnight when the zone skips midnight that day.
pub fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub fn start_of_day(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    local_midnight(now.with_timezone(tz).date_naive(), tz)
}

pub fn start_of_month(now: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let today = now.with_timezone(tz).date_naive();
    let first = today.with_day(1).unwrap_or(today);
    local_midnight(first, tz)
}

/// Parse YYYY-MM-DD as local midnight in `tz`.
pub fn parse_date_start(s: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| format!("Invalid date format '{}'. Expected YYYY-MM-DD", s))?;
    Ok(local_midnight(date, tz))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, h, m, 0).unwrap()
    }

    #[test]
    fn retains_events_overlapping_the_window() {
        let window = DateWindow::new(at(12, 0), 1);

        // ended before the window opened
        assert!(!window.retains(at(9, 0), at(11, 59)));
        // ends exactly at the start
        assert!(window.retains(at(11, 0), at(12, 0)));
        // running across the start
        assert!(window.retains(at(11, 0), at(13, 0)));
        // starts exactly at the end
        assert!(!window.retains(window.end(), window.end() + Duration::hours(1)));
        assert!(window.retains(
            window.end() - Duration::seconds(1),
            window.end() + Duration::hours(1)
        ));
    }

    #[test]
    fn huge_windows_end_at_the_latest_instant() {
        let window = DateWindow::new(at(12, 0), u32::MAX);
        assert_eq!(window.end(), DateTime::<Utc>::MAX_UTC);
        assert!(window.retains(at(13, 0), at(14, 0)));
    }

    #[test]
    fn advance_is_monotonic() {
        let mut window = DateWindow::new(at(12, 0), 7);
        assert!(!window.advance_to(at(11, 0)));
        assert_eq!(window.start, at(12, 0));
        assert!(!window.advance_to(at(12, 0)));
        assert!(window.advance_to(at(13, 0)));
        assert_eq!(window.start, at(13, 0));
        assert_eq!(window.days, 7);
    }

    #[test]
    fn day_and_month_starts_follow_the_timezone() {
        let tz: Tz = "Europe/Berlin".parse().unwrap();
        // 23:30 UTC on the 20th is already the 21st in Berlin (UTC+1 in March before DST)
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 23, 30, 0).unwrap();
        assert_eq!(
            start_of_day(now, &tz),
            Utc.with_ymd_and_hms(2025, 3, 20, 23, 0, 0).unwrap()
        );
        assert_eq!(
            start_of_month(now, &tz),
            Utc.with_ymd_and_hms(2025, 2, 28, 23, 0, 0).unwrap()
        );
        assert_eq!(start_of_day(now, &Tz::UTC), at(0, 0));
    }

    #[test]
    fn parse_date_start_rejects_garbage() {
        assert_eq!(parse_date_start("2025-03-20", &Tz::UTC).unwrap(), at(0, 0));
        assert!(parse_date_start("20/03/2025", &Tz::UTC).is_err());
    }
}
