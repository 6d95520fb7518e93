//! One autonomous polling loop per feed.
//!
//! A [`Fetcher`] owns its window and its last successful result. It polls on a
//! fixed interval regardless of the outcome, and reports each outcome as a
//! [`Notification`]. Window updates and resend requests reach the running loop
//! through its [`FetcherHandle`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::client::FeedClient;
use crate::date_window::DateWindow;
use crate::error::CalFeedResult;
use crate::event::Event;
use crate::ics::parse_calendar;
use crate::notification::{Notification, NotificationSender};
use crate::source::SourceDescriptor;

#[derive(Debug)]
enum FetcherCommand {
    UpdateWindow(DateTime<Utc>),
    Broadcast,
}

pub struct Fetcher {
    descriptor: SourceDescriptor,
    client: Arc<dyn FeedClient>,
    timezone: Tz,
    window: DateWindow,
    last_events: Option<Vec<Event>>,
    notifications: NotificationSender,
}

impl Fetcher {
    pub fn new(
        descriptor: SourceDescriptor,
        client: Arc<dyn FeedClient>,
        timezone: Tz,
        notifications: NotificationSender,
    ) -> Self {
        let window = descriptor.initial_window();
        Fetcher {
            descriptor,
            client,
            timezone,
            window,
            last_events: None,
            notifications,
        }
    }

    /// Spawn the polling loop. The first poll happens immediately.
    pub fn start(self) -> FetcherHandle {
        let source_id = self.descriptor.source_id.clone();
        let (commands, rx) = mpsc::unbounded_channel();

        info!(
            source_id = %source_id,
            interval_ms = self.descriptor.fetch_interval_ms,
            "starting calendar fetcher"
        );
        let task = tokio::spawn(self.run(rx));

        FetcherHandle {
            source_id,
            commands,
            task,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<FetcherCommand>) {
        let mut ticker = time::interval(self.descriptor.fetch_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll().await,
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        debug!(source_id = %self.descriptor.source_id, "fetcher stopped");
    }

    fn handle(&mut self, command: FetcherCommand) {
        match command {
            FetcherCommand::UpdateWindow(start) => {
                // Applied on the next scheduled poll; no extra request.
                if self.window.advance_to(start) {
                    debug!(source_id = %self.descriptor.source_id, start = %start, "window advanced");
                }
            }
            FetcherCommand::Broadcast => self.broadcast(),
        }
    }

    async fn poll(&mut self) {
        let source_id = self.descriptor.source_id.clone();

        match self.fetch_events().await {
            Ok(events) => {
                debug!(source_id = %source_id, count = events.len(), "calendar fetched");
                self.last_events = Some(events);
                self.broadcast();
            }
            Err(error) => {
                // Keep the previous result; the next tick retries.
                warn!(source_id = %source_id, error = %error, "calendar fetch failed");
                self.notifications
                    .send(Notification::FetchError { source_id, error });
            }
        }
    }

    async fn fetch_events(&self) -> CalFeedResult<Vec<Event>> {
        let raw = self.client.fetch(&self.descriptor).await?;
        let events = parse_calendar(&raw, &self.descriptor.source_id, &self.window, &self.timezone)?;
        Ok(filter_events(events, &self.window, &self.descriptor))
    }

    /// Re-send the last successful result, if there is one.
    fn broadcast(&self) {
        if let Some(events) = &self.last_events {
            self.notifications.send(Notification::EventsReady {
                source_id: self.descriptor.source_id.clone(),
                events: events.clone(),
            });
        }
    }
}

/// Drop excluded titles and anything outside `window`, order chronologically
/// and keep at most `max_entries`.
pub(crate) fn filter_events(
    events: Vec<Event>,
    window: &DateWindow,
    descriptor: &SourceDescriptor,
) -> Vec<Event> {
    let mut kept: Vec<Event> = events
        .into_iter()
        .filter(|e| !descriptor.is_excluded(&e.title))
        .filter(|e| window.retains(e.start_date, e.end_date))
        .collect();

    kept.sort_by_key(|e| e.start_date);
    kept.truncate(descriptor.max_entries);
    kept
}

/// Control side of a running [`Fetcher`].
#[derive(Debug)]
pub struct FetcherHandle {
    source_id: String,
    commands: mpsc::UnboundedSender<FetcherCommand>,
    task: JoinHandle<()>,
}

impl FetcherHandle {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Already running: only re-broadcast the last known events.
    pub fn start(&self) {
        self.send(FetcherCommand::Broadcast);
    }

    pub fn update_window(&self, start: DateTime<Utc>) {
        self.send(FetcherCommand::UpdateWindow(start));
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    fn send(&self, command: FetcherCommand) {
        if self.commands.send(command).is_err() {
            warn!(source_id = %self.source_id, "fetcher is no longer running");
        }
    }
}
