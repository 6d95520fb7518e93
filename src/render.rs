//! Terminal rendering for the merged agenda and source health.

use calfeed_core::{AgendaEntry, Event, SourceStatus};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use chrono_tz::Tz;
use owo_colors::OwoColorize;

/// Extension trait for colored terminal output.
pub trait Render {
    fn render(&self) -> String;
}

impl Render for SourceStatus {
    fn render(&self) -> String {
        if self.invalid {
            return format!("{} {} {}", "✗".red(), self.source_id, "(invalid URL)".red());
        }

        match (&self.last_error, self.fetched) {
            (None, true) => format!(
                "{} {} {}",
                "✓".green(),
                self.source_id,
                format!("({} {})", self.cached_events, pluralize("event", self.cached_events)).dimmed()
            ),
            (Some(error), fetched) => {
                let cached = if fetched {
                    format!(" (showing {} cached)", self.cached_events)
                } else {
                    String::new()
                };
                format!("{} {}{}\n    {}", "!".yellow(), self.source_id, cached.dimmed(), error.red())
            }
            (None, false) => format!("{} {} {}", "…".dimmed(), self.source_id, "(waiting)".dimmed()),
        }
    }
}

/// Agenda lines grouped under day headings.
pub fn render_agenda(entries: &[AgendaEntry], tz: &Tz, now: DateTime<Utc>) -> Vec<String> {
    let today = now.with_timezone(tz).date_naive();
    let mut lines = Vec::new();
    let mut current_label: Option<String> = None;

    for entry in entries {
        let label = format_date_label(entry.event.start_date.with_timezone(tz).date_naive(), today);
        if current_label.as_ref() != Some(&label) {
            if current_label.is_some() {
                lines.push(String::new());
            }
            lines.push(label.bold().to_string());
            current_label = Some(label);
        }

        let time = format_time(&entry.event, tz);
        let title = match anniversary(&entry.event, tz) {
            Some(years) => format!("{} {}", entry.event.title, format!("({years})").dimmed()),
            None => entry.event.title.clone(),
        };
        let title = if entry.is_today {
            title.green().to_string()
        } else {
            title
        };
        lines.push(format!("  {} {}", time, title));
    }

    lines
}

/// "Today", "Tomorrow", or e.g. "Wed Feb 25"
pub fn format_date_label(date: NaiveDate, today: NaiveDate) -> String {
    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}

/// "15:00", or "all-day" padded to the same width.
pub fn format_time(event: &Event, tz: &Tz) -> String {
    if event.full_day_event {
        "all-day".to_string()
    } else {
        format!("{:>7}", event.start_date.with_timezone(tz).format("%H:%M"))
    }
}

/// How many years a yearly recurring event has been going, e.g. a birthday.
fn anniversary(event: &Event, tz: &Tz) -> Option<i32> {
    let first = event.first_year?;
    let years = event.start_date.with_timezone(tz).year() - first;
    (years > 0).then_some(years)
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
mod tests {
    use calfeed_core::EventClass;
    use chrono::TimeZone;

    use super::*;

    fn event(title: &str, start: DateTime<Utc>, full_day: bool) -> Event {
        Event {
            title: title.into(),
            start_date: start,
            end_date: start + chrono::Duration::hours(1),
            full_day_event: full_day,
            source_id: "https://example.com/a.ics".into(),
            class: EventClass::Public,
            first_year: None,
        }
    }

    #[test]
    fn date_labels_are_relative_to_today() {
        let today = NaiveDate::from_ymd_opt(2025, 2, 24).unwrap();
        assert_eq!(format_date_label(today, today), "Today");
        assert_eq!(format_date_label(today.succ_opt().unwrap(), today), "Tomorrow");
        assert_eq!(
            format_date_label(NaiveDate::from_ymd_opt(2025, 2, 26).unwrap(), today),
            "Wed Feb 26"
        );
    }

    #[test]
    fn times_use_the_view_timezone() {
        let start = Utc.with_ymd_and_hms(2025, 3, 20, 14, 0, 0).unwrap();
        assert_eq!(format_time(&event("Sync", start, false), &chrono_tz::Europe::Berlin), "  15:00");
        assert_eq!(format_time(&event("Holiday", start, true), &Tz::UTC), "all-day");
    }

    #[test]
    fn anniversaries_count_whole_years() {
        let mut birthday = event("Ada", Utc.with_ymd_and_hms(2025, 12, 10, 0, 0, 0).unwrap(), true);
        assert_eq!(anniversary(&birthday, &Tz::UTC), None);
        birthday.first_year = Some(1990);
        assert_eq!(anniversary(&birthday, &Tz::UTC), Some(35));
    }

    #[test]
    fn agenda_groups_entries_by_day() {
        let now = Utc.with_ymd_and_hms(2025, 3, 20, 8, 0, 0).unwrap();
        let entries = vec![
            AgendaEntry {
                event: event("Standup", Utc.with_ymd_and_hms(2025, 3, 20, 9, 0, 0).unwrap(), false),
                is_today: true,
            },
            AgendaEntry {
                event: event("Review", Utc.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap(), false),
                is_today: true,
            },
            AgendaEntry {
                event: event("Retro", Utc.with_ymd_and_hms(2025, 3, 21, 10, 0, 0).unwrap(), false),
                is_today: false,
            },
        ];

        let lines = render_agenda(&entries, &Tz::UTC, now);
        assert_eq!(lines.len(), 6);
        assert!(lines[0].contains("Today"));
        assert!(lines[1].contains("Standup"));
        assert!(lines[3].is_empty());
        assert!(lines[4].contains("Tomorrow"));
        assert!(lines[5].contains("Retro"));
    }
}
