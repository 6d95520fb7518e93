//! Owns one fetcher per feed URL and routes requests to them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info};

use crate::client::FeedClient;
use crate::fetcher::{Fetcher, FetcherHandle};
use crate::notification::{Notification, NotificationSender, Request, RequestReceiver};
use crate::source::SourceDescriptor;

/// Fetchers keyed by source ID. Dropping the registry stops every fetcher.
pub struct Registry {
    fetchers: HashMap<String, FetcherHandle>,
    client: Arc<dyn FeedClient>,
    timezone: Tz,
    notifications: NotificationSender,
}

impl Registry {
    pub fn new(client: Arc<dyn FeedClient>, timezone: Tz, notifications: NotificationSender) -> Self {
        Registry {
            fetchers: HashMap::new(),
            client,
            timezone,
            notifications,
        }
    }

    /// Start a fetcher for `descriptor`, or ask the existing one to resend its
    /// last result. An unusable URL is reported as `InvalidSource` and no
    /// fetcher is created.
    pub fn register(&mut self, descriptor: SourceDescriptor) -> Option<&FetcherHandle> {
        let source_id = descriptor.source_id.clone();

        if let Err(e) = descriptor.validate() {
            error!(source_id = %source_id, error = %e, "refusing calendar source");
            self.notifications
                .send(Notification::InvalidSource { source_id });
            return None;
        }

        if let Some(handle) = self.fetchers.get(&source_id) {
            debug!(source_id = %source_id, "source already registered, resending");
            handle.start();
            return self.fetchers.get(&source_id);
        }

        info!(
            source_id = %source_id,
            interval_ms = descriptor.fetch_interval_ms,
            "creating calendar fetcher"
        );
        let handle = Fetcher::new(
            descriptor,
            Arc::clone(&self.client),
            self.timezone,
            self.notifications.clone(),
        )
        .start();

        Some(&*self.fetchers.entry(source_id).or_insert(handle))
    }

    /// Unknown sources are ignored; a window update can race registration.
    pub fn update_window(&self, source_id: &str, start: DateTime<Utc>) {
        match self.fetchers.get(source_id) {
            Some(handle) => handle.update_window(start),
            None => debug!(source_id, "window update for unknown source dropped"),
        }
    }

    pub fn dispatch(&mut self, request: Request) {
        match request {
            Request::AddSource(descriptor) => {
                self.register(descriptor);
            }
            Request::UpdateWindow { source_id, start } => self.update_window(&source_id, start),
        }
    }

    /// Serve requests until every sender is gone.
    pub async fn run(mut self, mut requests: RequestReceiver) {
        while let Some(request) = requests.recv().await {
            self.dispatch(request);
        }
        debug!(fetchers = self.fetchers.len(), "request channel closed, stopping fetchers");
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.fetchers.contains_key(source_id)
    }

    pub fn len(&self) -> usize {
        self.fetchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetchers.is_empty()
    }
}
