//! ICS feed parsing.
//!
//! Turns the raw bytes of a `VCALENDAR` feed into normalized [`Event`](crate::event::Event)
//! records, expanding recurring series inside the fetch window.

mod parse;
mod recurrence;

pub use parse::parse_calendar;
