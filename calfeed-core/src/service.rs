//! Wires the registry, the fetchers and the aggregator together.
//!
//! Two tasks run behind a [`ServiceHandle`]: the registry serving requests,
//! and the aggregator loop consuming notifications. The aggregator answers
//! every successful poll with a window update for that source. Readers take a
//! snapshot of the merged view through the handle.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::aggregator::{Aggregator, SourceStatus, ViewSettings};
use crate::client::{FeedClient, HttpFeedClient};
use crate::config::FeedConfig;
use crate::error::CalFeedResult;
use crate::event::{AgendaEntry, Event};
use crate::notification::{
    NotificationReceiver, RequestSender, notification_channel, request_channel,
};
use crate::registry::Registry;
use crate::source::SourceDescriptor;

/// Start the service for `sources`. Must be called from inside a tokio runtime.
pub fn spawn(
    settings: ViewSettings,
    sources: Vec<SourceDescriptor>,
    client: Arc<dyn FeedClient>,
) -> ServiceHandle {
    let (requests, request_rx) = request_channel();
    let (notifications, notification_rx) = notification_channel();

    let registry = Registry::new(client, settings.timezone, notifications);
    let registry_task = tokio::spawn(registry.run(request_rx));

    let aggregator = Aggregator::new(settings, sources);
    let initial = aggregator.add_source_requests(Utc::now());
    info!(sources = initial.len(), "starting calendar service");
    for request in initial {
        requests.send(request);
    }

    let aggregator = Arc::new(RwLock::new(aggregator));
    let (revision, _) = watch::channel(0u64);
    let revision = Arc::new(revision);

    let aggregator_task = tokio::spawn(aggregate(
        Arc::clone(&aggregator),
        notification_rx,
        requests,
        Arc::clone(&revision),
    ));

    ServiceHandle {
        aggregator,
        revision,
        registry_task,
        aggregator_task,
    }
}

/// Build the HTTP client, settings and sources from a loaded config.
pub fn spawn_from_config(config: &FeedConfig) -> CalFeedResult<ServiceHandle> {
    let settings = config.view_settings()?;
    let client = HttpFeedClient::new(&config.user_agent, config.fetch_timeout())?;
    let sources = config.source_descriptors(Utc::now());
    Ok(spawn(settings, sources, Arc::new(client)))
}

async fn aggregate(
    aggregator: Arc<RwLock<Aggregator>>,
    mut notifications: NotificationReceiver,
    requests: RequestSender,
    revision: Arc<watch::Sender<u64>>,
) {
    while let Some(notification) = notifications.recv().await {
        let reply = aggregator
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .handle(notification, Utc::now());

        if let Some(request) = reply {
            requests.send(request);
        }
        revision.send_modify(|r| *r += 1);
    }
    debug!("notification channel closed");
}

/// Running service. Dropping the handle stops every task and fetcher.
pub struct ServiceHandle {
    aggregator: Arc<RwLock<Aggregator>>,
    revision: Arc<watch::Sender<u64>>,
    registry_task: JoinHandle<()>,
    aggregator_task: JoinHandle<()>,
}

impl ServiceHandle {
    fn read<T>(&self, f: impl FnOnce(&Aggregator) -> T) -> T {
        f(&self.aggregator.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn current_view(&self) -> Vec<AgendaEntry> {
        self.read(Aggregator::current_view)
    }

    pub fn broadcast_list(&self) -> Vec<Event> {
        self.read(Aggregator::broadcast_list)
    }

    pub fn source_statuses(&self) -> Vec<SourceStatus> {
        self.read(Aggregator::source_statuses)
    }

    /// Bumped after every notification the aggregator handles.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Wait until every source has reported once. Returns false on timeout.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let mut changes = self.subscribe();
        let settled = async {
            loop {
                if self.read(Aggregator::all_reported) {
                    return true;
                }
                if changes.changed().await.is_err() {
                    return false;
                }
            }
        };
        tokio::time::timeout(timeout, settled)
            .await
            .unwrap_or(false)
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for ServiceHandle {
    fn drop(&mut self) {
        self.aggregator_task.abort();
        self.registry_task.abort();
    }
}
