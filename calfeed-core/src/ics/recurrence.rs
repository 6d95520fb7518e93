//! RRULE expansion for recurring events.
//!
//! Expands a master recurring event into the instances that overlap a fetch
//! window, respecting EXDATEs and per-instance overrides.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;
use tracing::warn;

use crate::constants::MAX_RECURRENCE_INSTANCES;
use crate::date_window::{DateWindow, local_midnight};
use crate::error::{CalFeedError, CalFeedResult};
use crate::event::Event;
use crate::ics::parse::{IcsTime, RawEvent};

/// Build an iCalendar-format RRULE string for the rrule crate parser.
fn build_rrule_string(master: &RawEvent, rrule: &str, tz: &Tz) -> String {
    let mut lines = vec![format!("DTSTART{}", ics_time_value(&master.start, tz))];
    lines.push(format!("RRULE:{}", rrule));
    for exdate in &master.exdates {
        lines.push(format!("EXDATE{}", ics_time_value(exdate, tz)));
    }
    lines.join("\n")
}

/// Property parameters and value for a DTSTART/EXDATE line.
///
/// The rrule crate needs datetimes, so all-day dates become midnight UTC and
/// floating times are pinned to the configured zone. TZIDs chrono-tz does not
/// know (e.g. Windows zone names) fall back to the configured zone as well.
fn ics_time_value(time: &IcsTime, tz: &Tz) -> String {
    match time {
        IcsTime::Date(d) => format!(":{}T000000Z", d.format("%Y%m%d")),
        IcsTime::DateTimeUtc(dt) => format!(":{}", dt.format("%Y%m%dT%H%M%SZ")),
        IcsTime::DateTimeFloating(dt) => {
            format!(";TZID={}:{}", tz.name(), dt.format("%Y%m%dT%H%M%S"))
        }
        IcsTime::DateTimeZoned { datetime, tzid } => {
            let zone = tzid.parse::<Tz>().unwrap_or(*tz);
            format!(";TZID={}:{}", zone.name(), datetime.format("%Y%m%dT%H%M%S"))
        }
    }
}

/// Expand a recurring master into instances overlapping `window`.
///
/// `overrides` maps (UID, original start) to a replacement VEVENT. A series whose
/// RRULE cannot be parsed degrades to its first occurrence.
pub(crate) fn expand_recurring(
    master: &RawEvent,
    source_id: &str,
    window: &DateWindow,
    tz: &Tz,
    overrides: &HashMap<(String, DateTime<Utc>), RawEvent>,
) -> CalFeedResult<Vec<Event>> {
    let first_year = Some(master.first_year(tz));
    let Some(rrule) = master.rrule.as_deref() else {
        return Ok(Vec::new());
    };

    let rrule_str = build_rrule_string(master, rrule, tz);
    let rrule_set: RRuleSet = match rrule_str.parse() {
        Ok(set) => set,
        Err(e) => {
            warn!(source_id, summary = %master.summary, error = %e, "unparseable RRULE, keeping first occurrence");
            let mut single = master.to_event(source_id, tz)?;
            single.first_year = first_year;
            return Ok(vec![single]);
        }
    };

    let master_start = master.start.to_utc(tz);
    let duration = master.end_utc(tz)? - master_start;

    // Instances that started before the window but are still running count too.
    // Subtract/add 1 second to make the range inclusive (after/before are exclusive).
    let rrule_tz: rrule::Tz = Utc.into();
    let after = window
        .start
        .checked_sub_signed(duration + Duration::seconds(1))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
        .with_timezone(&rrule_tz);
    let before = window
        .end()
        .checked_add_signed(Duration::seconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
        .with_timezone(&rrule_tz);

    let result = rrule_set.after(after).before(before).all(MAX_RECURRENCE_INSTANCES);

    result
        .dates
        .iter()
        .map(|occurrence| {
            let out_of_range =
                || CalFeedError::IcsParse(format!("'{}' recurs out of range", master.summary));

            let (start, end) = match &master.start {
                IcsTime::Date(d_start) => {
                    let date = occurrence.date_naive();
                    let day_span = match &master.end {
                        Some(IcsTime::Date(d_end)) => (*d_end - *d_start).num_days().max(1),
                        _ => 1,
                    };
                    let last = date
                        .checked_add_signed(Duration::days(day_span))
                        .ok_or_else(out_of_range)?;
                    (local_midnight(date, tz), local_midnight(last, tz))
                }
                _ => {
                    let start = occurrence.with_timezone(&Utc);
                    let end = start.checked_add_signed(duration).ok_or_else(out_of_range)?;
                    (start, end)
                }
            };

            let key = master.uid.clone().map(|uid| (uid, start));
            let mut instance = match key.and_then(|k| overrides.get(&k)) {
                Some(replacement) => replacement.to_event(source_id, tz)?,
                None => Event {
                    start_date: start,
                    end_date: end,
                    ..master.to_event(source_id, tz)?
                },
            };
            instance.first_year = first_year;
            Ok(instance)
        })
        .collect()
}
