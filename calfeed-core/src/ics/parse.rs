//! ICS feed parsing using the icalendar crate's parser.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use icalendar::{
    DatePerhapsTime,
    parser::{Component, Property, read_calendar, unfold},
};

use crate::date_window::{DateWindow, local_midnight};
use crate::error::{CalFeedError, CalFeedResult};
use crate::event::{Event, EventClass};
use crate::ics::recurrence::expand_recurring;

/// A DTSTART/DTEND-style value before it is pinned to an instant.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum IcsTime {
    Date(NaiveDate),
    DateTimeUtc(DateTime<Utc>),
    DateTimeFloating(NaiveDateTime),
    DateTimeZoned { datetime: NaiveDateTime, tzid: String },
}

impl IcsTime {
    /// Resolve to an instant. Dates and floating times are read in `tz`, as is
    /// any TZID chrono-tz does not know.
    pub(crate) fn to_utc(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            IcsTime::Date(d) => local_midnight(*d, tz),
            IcsTime::DateTimeUtc(dt) => *dt,
            IcsTime::DateTimeFloating(naive) => resolve_local(naive, tz),
            IcsTime::DateTimeZoned { datetime, tzid } => {
                let zone = tzid.parse::<Tz>().unwrap_or(*tz);
                resolve_local(datetime, &zone)
            }
        }
    }

    pub(crate) fn is_date(&self) -> bool {
        matches!(self, IcsTime::Date(_))
    }
}

fn resolve_local(naive: &NaiveDateTime, tz: &Tz) -> DateTime<Utc> {
    tz.from_local_datetime(naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// One VEVENT, before recurrence expansion.
#[derive(Debug, Clone)]
pub(crate) struct RawEvent {
    pub uid: Option<String>,
    pub summary: String,
    pub start: IcsTime,
    pub end: Option<IcsTime>,
    pub duration: Option<Duration>,
    pub class: EventClass,
    pub rrule: Option<String>,
    pub exdates: Vec<IcsTime>,
    pub recurrence_id: Option<IcsTime>,
}

impl RawEvent {
    /// End instant, derived from DURATION or the start when DTEND is missing.
    /// A DURATION reaching past the representable range is a parse error.
    pub(crate) fn end_utc(&self, tz: &Tz) -> CalFeedResult<DateTime<Utc>> {
        let start = self.start.to_utc(tz);
        let end = match (&self.end, self.duration) {
            (Some(end), _) => Some(end.to_utc(tz).max(start)),
            (None, Some(duration)) => start.checked_add_signed(duration),
            (None, None) if self.start.is_date() => start.checked_add_signed(Duration::days(1)),
            (None, None) => Some(start),
        };

        end.ok_or_else(|| {
            CalFeedError::IcsParse(format!("'{}' ends out of range", self.summary))
        })
    }

    pub(crate) fn to_event(&self, source_id: &str, tz: &Tz) -> CalFeedResult<Event> {
        Ok(Event {
            title: self.summary.clone(),
            start_date: self.start.to_utc(tz),
            end_date: self.end_utc(tz)?,
            full_day_event: self.start.is_date(),
            source_id: source_id.to_string(),
            class: self.class,
            first_year: None,
        })
    }

    pub(crate) fn first_year(&self, tz: &Tz) -> i32 {
        match &self.start {
            IcsTime::Date(d) => d.year(),
            other => other.to_utc(tz).with_timezone(tz).year(),
        }
    }
}

/// Parse a whole feed into events.
///
/// Recurring series are expanded into the instances overlapping `window`;
/// single events are returned regardless of the window and in feed order.
/// VEVENTs without a usable DTSTART are skipped.
pub fn parse_calendar(
    raw: &[u8],
    source_id: &str,
    window: &DateWindow,
    tz: &Tz,
) -> CalFeedResult<Vec<Event>> {
    let content = String::from_utf8_lossy(raw);
    if !content.contains("BEGIN:VCALENDAR") {
        return Err(CalFeedError::IcsParse(format!(
            "{source_id}: response is not an iCalendar feed"
        )));
    }

    let unfolded = unfold(&content);
    let calendar =
        read_calendar(&unfolded).map_err(|e| CalFeedError::IcsParse(format!("{source_id}: {e}")))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let raw_events: Vec<RawEvent> = vevents.into_iter().filter_map(parse_vevent).collect();

    // Overrides for individual instances, keyed by series UID and original start.
    let mut overrides: HashMap<(String, DateTime<Utc>), RawEvent> = HashMap::new();
    for event in &raw_events {
        if let (Some(uid), Some(recurrence_id)) = (&event.uid, &event.recurrence_id) {
            overrides.insert((uid.clone(), recurrence_id.to_utc(tz)), event.clone());
        }
    }
    let series: HashSet<&str> = raw_events
        .iter()
        .filter(|e| e.rrule.is_some() && e.recurrence_id.is_none())
        .filter_map(|e| e.uid.as_deref())
        .collect();

    let mut events = Vec::new();
    for event in &raw_events {
        if event.recurrence_id.is_some() {
            // Consumed by its series; stands alone only when the master is absent.
            let orphan = event.uid.as_deref().is_none_or(|uid| !series.contains(uid));
            if orphan {
                events.push(event.to_event(source_id, tz)?);
            }
            continue;
        }

        if event.rrule.is_some() {
            events.extend(expand_recurring(event, source_id, window, tz, &overrides)?);
        } else {
            events.push(event.to_event(source_id, tz)?);
        }
    }

    Ok(events)
}

fn collect_vevents<'a>(components: &'a [Component<'a>], out: &mut Vec<&'a Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else if component.name == "VCALENDAR" {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component) -> Option<RawEvent> {
    let start = to_ics_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?);
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_ics_time);
    let duration = vevent
        .find_prop("DURATION")
        .and_then(|p| parse_duration(p.val.as_ref()));

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_else(|| "(No title)".to_string());
    let uid = vevent.find_prop("UID").map(|p| p.val.to_string());
    let class = vevent
        .find_prop("CLASS")
        .map(|p| EventClass::from_ics_str(p.val.as_ref()))
        .unwrap_or_default();

    let rrule = vevent.find_prop("RRULE").map(|p| p.val.to_string());
    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(parse_exdate_property)
        .collect();
    let recurrence_id = vevent
        .find_prop("RECURRENCE-ID")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_ics_time);

    Some(RawEvent {
        uid,
        summary,
        start,
        end,
        duration,
        class,
        rrule,
        exdates,
        recurrence_id,
    })
}

fn to_ics_time(dpt: DatePerhapsTime) -> IcsTime {
    match dpt {
        DatePerhapsTime::Date(d) => IcsTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => IcsTime::DateTimeUtc(dt),
            icalendar::CalendarDateTime::Floating(naive) => IcsTime::DateTimeFloating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => {
                IcsTime::DateTimeZoned {
                    datetime: date_time,
                    tzid,
                }
            }
        },
    }
}

/// DURATION values like `PT1H30M` or `P1D`. Negative durations are ignored.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.starts_with('-') {
        return None;
    }
    let parsed = iso8601::duration(value.trim_start_matches('+')).ok()?;
    let std_duration: std::time::Duration = parsed.into();
    Duration::from_std(std_duration).ok()
}

/// EXDATE values, honouring TZID and VALUE=DATE and comma-separated lists.
fn parse_exdate_property(prop: &Property) -> Vec<IcsTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(IcsTime::Date)
            } else if let Some(ref tz) = tzid {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::DateTimeZoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(s) = s.strip_suffix('Z') {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::DateTimeUtc(dt.and_utc()))
            } else {
                NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(IcsTime::DateTimeFloating)
            }
        })
        .collect()
}
