//! Messages exchanged between the fetch side and the aggregation side.
//!
//! Requests flow from the aggregator to the registry, notifications flow back.
//! Both directions are unbounded tokio channels; each fetcher sends through a
//! single sender from a single task, so one source's notifications arrive in
//! the order its polls completed. Nothing is persisted.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::CalFeedError;
use crate::event::Event;
use crate::source::SourceDescriptor;

/// Aggregator → registry.
#[derive(Debug, Clone)]
pub enum Request {
    AddSource(SourceDescriptor),
    UpdateWindow {
        source_id: String,
        start: DateTime<Utc>,
    },
}

/// Registry/fetchers → aggregator.
#[derive(Debug)]
pub enum Notification {
    /// A poll succeeded. Sent on every success, even when nothing changed.
    EventsReady {
        source_id: String,
        events: Vec<Event>,
    },
    FetchError {
        source_id: String,
        error: CalFeedError,
    },
    /// Sent once, at registration, when the URL is unusable.
    InvalidSource { source_id: String },
}

impl Notification {
    pub fn source_id(&self) -> &str {
        match self {
            Notification::EventsReady { source_id, .. }
            | Notification::FetchError { source_id, .. }
            | Notification::InvalidSource { source_id } => source_id,
        }
    }
}

pub type RequestReceiver = mpsc::UnboundedReceiver<Request>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

#[derive(Debug, Clone)]
pub struct RequestSender(mpsc::UnboundedSender<Request>);

#[derive(Debug, Clone)]
pub struct NotificationSender(mpsc::UnboundedSender<Notification>);

impl RequestSender {
    /// Returns false once the registry side has gone away.
    pub fn send(&self, request: Request) -> bool {
        self.0
            .send(request)
            .map_err(|e| debug!(request = ?e.0, "registry gone, dropping request"))
            .is_ok()
    }
}

impl NotificationSender {
    /// Returns false once the aggregator side has gone away.
    pub fn send(&self, notification: Notification) -> bool {
        self.0
            .send(notification)
            .map_err(|e| debug!(source_id = e.0.source_id(), "aggregator gone, dropping notification"))
            .is_ok()
    }
}

pub fn request_channel() -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RequestSender(tx), rx)
}

pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (NotificationSender(tx), rx)
}
