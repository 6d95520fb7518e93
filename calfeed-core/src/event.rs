//! Normalized event records.
//!
//! Every feed is reduced to these types by the ICS adapter; fetchers, the
//! aggregator and the CLI never look at raw calendar data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single calendar entry produced by parsing a feed.
///
/// Recurring events arrive already expanded: each instance is its own `Event`
/// and `first_year` remembers the year the series started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub title: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub full_day_event: bool,
    /// URL of the feed this event came from.
    pub source_id: String,
    pub class: EventClass,
    pub first_year: Option<i32>,
}

impl Event {
    /// An event is expired once its end lies strictly before `now`.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end_date < now
    }

    pub fn is_private(&self) -> bool {
        self.class == EventClass::Private
    }
}

/// iCalendar CLASS property, collapsed to what the view cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventClass {
    #[default]
    Public,
    Private,
}

impl EventClass {
    /// CONFIDENTIAL is treated like PRIVATE; anything unknown is public.
    pub fn from_ics_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "PRIVATE" | "CONFIDENTIAL" => EventClass::Private,
            _ => EventClass::Public,
        }
    }
}

/// An event as it appears in the aggregated view.
///
/// `is_today` is derived at view time, never stored on the cached `Event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgendaEntry {
    #[serde(flatten)]
    pub event: Event,
    pub is_today: bool,
}
