//! Calendar feed aggregation for calfeed.
//!
//! - `fetcher` polls one ICS feed and reports results as notifications
//! - `registry` owns the fetchers and routes requests to them
//! - `aggregator` merges the per-feed caches into a single agenda
//! - `service` runs all of the above behind a handle

pub mod aggregator;
pub mod client;
pub mod config;
pub mod constants;
pub mod date_window;
pub mod error;
pub mod event;
pub mod fetcher;
pub mod ics;
pub mod notification;
pub mod registry;
pub mod service;
pub mod source;

pub use aggregator::{Aggregator, CalendarFormat, SourceStatus, StartDate, ViewSettings};
pub use client::{FeedClient, HttpFeedClient};
pub use config::FeedConfig;
pub use date_window::DateWindow;
pub use error::{CalFeedError, CalFeedResult};
pub use event::{AgendaEntry, Event, EventClass};
pub use fetcher::{Fetcher, FetcherHandle};
pub use notification::{Notification, Request};
pub use registry::Registry;
pub use service::ServiceHandle;
pub use source::{Auth, SourceDescriptor};
