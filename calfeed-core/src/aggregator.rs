//! Merges the per-source caches into one agenda.
//!
//! The aggregator is plain synchronous state: it is fed notifications one at a
//! time by the service loop and computes views on demand. A view is always a
//! function of the caches and the instant it is computed for.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::constants::DEFAULT_MAXIMUM_ENTRIES;
use crate::date_window::{start_of_day, start_of_month};
use crate::error::CalFeedError;
use crate::event::{AgendaEntry, Event};
use crate::notification::{Notification, Request};
use crate::source::SourceDescriptor;

/// `list` starts the window today, `monthly` at the first of the month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CalendarFormat {
    #[default]
    List,
    Monthly,
}

/// What "now" means for the window and the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartDate {
    #[default]
    Today,
    /// Pretend it is this instant (debugging aid).
    Fixed(DateTime<Utc>),
}

#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub maximum_entries: usize,
    pub hide_private: bool,
    pub start_date: StartDate,
    pub calendar_format: CalendarFormat,
    pub timezone: Tz,
}

impl Default for ViewSettings {
    fn default() -> Self {
        ViewSettings {
            maximum_entries: DEFAULT_MAXIMUM_ENTRIES,
            hide_private: false,
            start_date: StartDate::Today,
            calendar_format: CalendarFormat::List,
            timezone: Tz::UTC,
        }
    }
}

/// Per-source health as seen by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub fetched: bool,
    pub cached_events: usize,
    pub last_error: Option<String>,
    pub invalid: bool,
}

#[derive(Debug)]
struct SourceSlot {
    descriptor: SourceDescriptor,
    /// `None` until the first successful poll.
    events: Option<Vec<Event>>,
    last_error: Option<String>,
    invalid: bool,
}

impl SourceSlot {
    fn has_reported(&self) -> bool {
        self.events.is_some() || self.last_error.is_some() || self.invalid
    }
}

pub struct Aggregator {
    settings: ViewSettings,
    slots: Vec<SourceSlot>,
    index: HashMap<String, usize>,
}

impl Aggregator {
    /// Sources keep the given order, which breaks ties between equal start
    /// times. A repeated source ID keeps its first descriptor.
    pub fn new(settings: ViewSettings, sources: Vec<SourceDescriptor>) -> Self {
        let mut slots = Vec::with_capacity(sources.len());
        let mut index = HashMap::new();

        for descriptor in sources {
            if index.contains_key(&descriptor.source_id) {
                warn!(source_id = %descriptor.source_id, "duplicate calendar source ignored");
                continue;
            }
            index.insert(descriptor.source_id.clone(), slots.len());
            slots.push(SourceSlot {
                descriptor,
                events: None,
                last_error: None,
                invalid: false,
            });
        }

        Aggregator {
            settings,
            slots,
            index,
        }
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.slots.iter().map(|s| &s.descriptor)
    }

    fn current_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.settings.start_date {
            StartDate::Today => now,
            StartDate::Fixed(date) => date,
        }
    }

    /// Start of the fetch window for `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let current = self.current_date(now);
        match self.settings.calendar_format {
            CalendarFormat::List => current,
            CalendarFormat::Monthly => start_of_month(current, &self.settings.timezone),
        }
    }

    /// One `AddSource` per configured source, windows starting at `now`.
    pub fn add_source_requests(&self, now: DateTime<Utc>) -> Vec<Request> {
        let start = self.window_start(now);
        self.sources()
            .map(|descriptor| {
                Request::AddSource(SourceDescriptor {
                    start_date: start,
                    ..descriptor.clone()
                })
            })
            .collect()
    }

    /// Dispatch one notification. Successful polls answer with the window the
    /// fetcher should use from now on.
    pub fn handle(&mut self, notification: Notification, now: DateTime<Utc>) -> Option<Request> {
        match notification {
            Notification::EventsReady { source_id, events } => {
                Some(self.on_events_ready(source_id, events, now))
            }
            Notification::FetchError { source_id, error } => {
                self.on_fetch_error(&source_id, &error);
                None
            }
            Notification::InvalidSource { source_id } => {
                self.on_invalid_source(&source_id);
                None
            }
        }
    }

    /// A success always replaces the cache, even with an empty set.
    pub fn on_events_ready(
        &mut self,
        source_id: String,
        events: Vec<Event>,
        now: DateTime<Utc>,
    ) -> Request {
        match self.index.get(&source_id) {
            Some(&i) => {
                debug!(source_id = %source_id, count = events.len(), "events cached");
                let slot = &mut self.slots[i];
                slot.events = Some(events);
                slot.last_error = None;
            }
            None => debug!(source_id = %source_id, "events for unknown source ignored"),
        }

        Request::UpdateWindow {
            start: self.window_start(now),
            source_id,
        }
    }

    /// Errors are recorded but never clear cached events.
    pub fn on_fetch_error(&mut self, source_id: &str, error: &CalFeedError) {
        warn!(source_id, error = %error, "could not fetch calendar");
        if let Some(&i) = self.index.get(source_id) {
            self.slots[i].last_error = Some(error.to_string());
        }
    }

    pub fn on_invalid_source(&mut self, source_id: &str) {
        error!(source_id, "incorrect calendar url");
        if let Some(&i) = self.index.get(source_id) {
            self.slots[i].invalid = true;
        }
    }

    /// Merged view as of `now`: per-source caps, expired and (optionally)
    /// private events dropped, stable-sorted by start, global cap applied.
    pub fn view_at(&self, now: DateTime<Utc>) -> Vec<AgendaEntry> {
        let now = self.current_date(now);
        let today = start_of_day(now, &self.settings.timezone);
        let tomorrow = today + Duration::hours(24);

        let mut events: Vec<&Event> = self
            .slots
            .iter()
            .filter_map(|slot| {
                slot.events
                    .as_ref()
                    .map(|events| events.iter().take(slot.descriptor.max_entries))
            })
            .flatten()
            .filter(|e| !e.has_ended(now))
            .filter(|e| !(self.settings.hide_private && e.is_private()))
            .collect();

        events.sort_by_key(|e| e.start_date);
        events.truncate(self.settings.maximum_entries);

        events
            .into_iter()
            .map(|event| AgendaEntry {
                is_today: event.start_date >= today && event.start_date < tomorrow,
                event: event.clone(),
            })
            .collect()
    }

    pub fn current_view(&self) -> Vec<AgendaEntry> {
        self.view_at(Utc::now())
    }

    /// Every cached event from every source, sorted by start, with no caps
    /// or expiry filtering.
    pub fn broadcast_list(&self) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .slots
            .iter()
            .filter_map(|slot| slot.events.as_ref())
            .flatten()
            .cloned()
            .collect();
        events.sort_by_key(|e| e.start_date);
        events
    }

    pub fn cached_events(&self, source_id: &str) -> Option<&[Event]> {
        let &i = self.index.get(source_id)?;
        self.slots[i].events.as_deref()
    }

    /// True once every source has produced events, an error or a rejection.
    pub fn all_reported(&self) -> bool {
        self.slots.iter().all(SourceSlot::has_reported)
    }

    pub fn source_statuses(&self) -> Vec<SourceStatus> {
        self.slots
            .iter()
            .map(|slot| SourceStatus {
                source_id: slot.descriptor.source_id.clone(),
                fetched: slot.events.is_some(),
                cached_events: slot.events.as_ref().map_or(0, Vec::len),
                last_error: slot.last_error.clone(),
                invalid: slot.invalid,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::event::EventClass;

    const A: &str = "https://example.com/a.ics";
    const B: &str = "https://example.com/b.ics";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 20, 12, 0, 0).unwrap()
    }

    fn source(url: &str, max_entries: usize) -> SourceDescriptor {
        SourceDescriptor {
            source_id: url.into(),
            fetch_interval_ms: 60_000,
            max_entries,
            max_window_days: 365,
            auth: None,
            start_date: now(),
            excluded_events: vec![],
        }
    }

    fn event(source_id: &str, title: &str, start: DateTime<Utc>) -> Event {
        Event {
            title: title.into(),
            start_date: start,
            end_date: start + Duration::minutes(30),
            full_day_event: false,
            source_id: source_id.into(),
            class: EventClass::Public,
            first_year: None,
        }
    }

    fn aggregator(maximum_entries: usize) -> Aggregator {
        let settings = ViewSettings {
            maximum_entries,
            ..ViewSettings::default()
        };
        Aggregator::new(settings, vec![source(A, 10), source(B, 10)])
    }

    fn titles(view: &[AgendaEntry]) -> Vec<String> {
        view.iter()
            .map(|e| format!("{}@{}", e.event.source_id.trim_start_matches("https://example.com/"), e.event.title))
            .collect()
    }

    #[test]
    fn merges_sorts_and_caps_across_sources() {
        let mut agg = aggregator(2);
        agg.on_events_ready(
            A.into(),
            vec![
                event(A, "+1h", now() + Duration::hours(1)),
                event(A, "+2h", now() + Duration::hours(2)),
            ],
            now(),
        );
        agg.on_events_ready(B.into(), vec![event(B, "+30m", now() + Duration::minutes(30))], now());

        assert_eq!(titles(&agg.view_at(now())), vec!["b.ics@+30m", "a.ics@+1h"]);
    }

    #[test]
    fn equal_starts_keep_source_order() {
        let mut agg = aggregator(10);
        let at = now() + Duration::hours(1);
        agg.on_events_ready(B.into(), vec![event(B, "second", at)], now());
        agg.on_events_ready(A.into(), vec![event(A, "first", at), event(A, "third", at)], now());

        assert_eq!(
            titles(&agg.view_at(now())),
            vec!["a.ics@first", "a.ics@third", "b.ics@second"]
        );
    }

    #[test]
    fn expiry_boundary_is_strict() {
        let mut agg = aggregator(10);
        let mut ended = event(A, "ended", now() - Duration::hours(1));
        ended.end_date = now() - Duration::milliseconds(1);
        let mut running = event(A, "running", now() - Duration::hours(1));
        running.end_date = now() + Duration::milliseconds(1);
        agg.on_events_ready(A.into(), vec![ended, running], now());

        assert_eq!(titles(&agg.view_at(now())), vec!["a.ics@running"]);
    }

    #[test]
    fn per_source_cap_applies_before_global_cap() {
        let settings = ViewSettings {
            maximum_entries: 10,
            ..ViewSettings::default()
        };
        let mut agg = Aggregator::new(settings, vec![source(A, 2), source(B, 10)]);
        agg.on_events_ready(
            A.into(),
            (1..=5)
                .map(|h| event(A, &format!("{h}"), now() + Duration::hours(h)))
                .collect(),
            now(),
        );
        agg.on_events_ready(B.into(), vec![event(B, "x", now() + Duration::hours(3))], now());

        let view = agg.view_at(now());
        assert_eq!(view.iter().filter(|e| e.event.source_id == A).count(), 2);
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn view_is_sorted_and_stable_between_calls() {
        let mut agg = aggregator(10);
        agg.on_events_ready(
            A.into(),
            vec![
                event(A, "c", now() + Duration::hours(5)),
                event(A, "a", now() + Duration::hours(1)),
            ],
            now(),
        );
        agg.on_events_ready(B.into(), vec![event(B, "b", now() + Duration::hours(3))], now());

        let first = agg.view_at(now());
        assert!(first.windows(2).all(|w| w[0].event.start_date <= w[1].event.start_date));
        assert_eq!(first, agg.view_at(now()));
    }

    #[test]
    fn fetch_error_keeps_every_cache() {
        let mut agg = aggregator(10);
        agg.on_events_ready(A.into(), vec![event(A, "a", now() + Duration::hours(1))], now());
        agg.on_events_ready(B.into(), vec![event(B, "b", now() + Duration::hours(2))], now());

        let update = agg.handle(
            Notification::FetchError {
                source_id: A.into(),
                error: CalFeedError::FetchTimeout(std::time::Duration::from_secs(30)),
            },
            now(),
        );
        assert!(update.is_none());
        assert_eq!(titles(&agg.view_at(now())), vec!["a.ics@a", "b.ics@b"]);
        assert_eq!(agg.cached_events(B).map(<[Event]>::len), Some(1));

        let status = &agg.source_statuses()[0];
        assert_eq!(status.last_error.as_deref(), Some("Fetch timed out after 30s"));
        assert!(status.fetched);
    }

    #[test]
    fn empty_success_overwrites_the_cache() {
        let mut agg = aggregator(10);
        agg.on_events_ready(
            A.into(),
            (1..=3)
                .map(|h| event(A, "x", now() + Duration::hours(h)))
                .collect(),
            now(),
        );
        agg.on_events_ready(A.into(), vec![], now());

        assert_eq!(agg.cached_events(A), Some(&[][..]));
        assert!(agg.view_at(now()).is_empty());
    }

    #[test]
    fn hide_private_drops_private_events() {
        let settings = ViewSettings {
            hide_private: true,
            ..ViewSettings::default()
        };
        let mut agg = Aggregator::new(settings, vec![source(A, 10)]);
        let mut secret = event(A, "secret", now() + Duration::hours(1));
        secret.class = EventClass::Private;
        agg.on_events_ready(A.into(), vec![secret, event(A, "open", now() + Duration::hours(2))], now());

        assert_eq!(titles(&agg.view_at(now())), vec!["a.ics@open"]);
        assert_eq!(agg.broadcast_list().len(), 2);
    }

    #[test]
    fn today_flag_is_computed_at_view_time() {
        let mut agg = aggregator(10);
        let mut tonight = event(A, "tonight", Utc.with_ymd_and_hms(2025, 3, 20, 23, 0, 0).unwrap());
        tonight.end_date = Utc.with_ymd_and_hms(2025, 3, 21, 2, 0, 0).unwrap();
        agg.on_events_ready(
            A.into(),
            vec![
                tonight,
                event(A, "tomorrow", Utc.with_ymd_and_hms(2025, 3, 21, 0, 0, 0).unwrap()),
            ],
            now(),
        );

        let view = agg.view_at(now());
        assert!(view[0].is_today);
        assert!(!view[1].is_today);

        let next_day = Utc.with_ymd_and_hms(2025, 3, 21, 0, 0, 0).unwrap();
        let view = agg.view_at(next_day);
        assert_eq!(view.len(), 2);
        assert!(!view[0].is_today);
        assert!(view[1].is_today);
    }

    #[test]
    fn unknown_sources_are_ignored_but_still_get_a_window() {
        let mut agg = aggregator(10);
        let update = agg.on_events_ready(
            "https://example.com/stranger.ics".into(),
            vec![event(A, "x", now() + Duration::hours(1))],
            now(),
        );

        assert!(agg.view_at(now()).is_empty());
        match update {
            Request::UpdateWindow { source_id, start } => {
                assert_eq!(source_id, "https://example.com/stranger.ics");
                assert_eq!(start, now());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn window_start_follows_format_and_fixed_date() {
        let monthly = Aggregator::new(
            ViewSettings {
                calendar_format: CalendarFormat::Monthly,
                ..ViewSettings::default()
            },
            vec![source(A, 10)],
        );
        assert_eq!(
            monthly.window_start(now()),
            Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
        );

        let fixed_at = Utc.with_ymd_and_hms(2024, 12, 24, 0, 0, 0).unwrap();
        let fixed = Aggregator::new(
            ViewSettings {
                start_date: StartDate::Fixed(fixed_at),
                ..ViewSettings::default()
            },
            vec![source(A, 10)],
        );
        assert_eq!(fixed.window_start(now()), fixed_at);
        match &fixed.add_source_requests(now())[0] {
            Request::AddSource(descriptor) => assert_eq!(descriptor.start_date, fixed_at),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn reporting_tracks_every_outcome() {
        let mut agg = aggregator(10);
        assert!(!agg.all_reported());
        agg.on_invalid_source(A);
        assert!(!agg.all_reported());
        agg.on_fetch_error(B, &CalFeedError::Http("connection refused".into()));
        assert!(agg.all_reported());
        assert!(agg.source_statuses()[0].invalid);
    }

    #[test]
    fn duplicate_sources_collapse() {
        let agg = Aggregator::new(ViewSettings::default(), vec![source(A, 10), source(A, 3)]);
        assert_eq!(agg.sources().count(), 1);
        assert_eq!(agg.sources().next().map(|s| s.max_entries), Some(10));
    }
}
