//! Retrieval of raw feed bytes.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{CalFeedError, CalFeedResult};
use crate::source::SourceDescriptor;

/// Something that can download a feed. Shared by all fetchers; one fetcher's
/// request never waits on another's.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, source: &SourceDescriptor) -> CalFeedResult<Vec<u8>>;
}

/// reqwest-backed client with a per-request deadline.
#[derive(Clone, Debug)]
pub struct HttpFeedClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedClient {
    pub fn new(user_agent: &str, timeout: Duration) -> CalFeedResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| CalFeedError::Config(format!("Could not build HTTP client: {e}")))?;

        Ok(HttpFeedClient { client, timeout })
    }

    async fn get(&self, source: &SourceDescriptor) -> CalFeedResult<Vec<u8>> {
        let mut request = self.client.get(source.url());
        if let Some(auth) = &source.auth {
            request = request.basic_auth(&auth.user, Some(&auth.pass));
        }

        let response = request.send().await?.error_for_status()?;
        let body = response.bytes().await?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch(&self, source: &SourceDescriptor) -> CalFeedResult<Vec<u8>> {
        timeout(self.timeout, self.get(source))
            .await
            .map_err(|_| CalFeedError::FetchTimeout(self.timeout))?
    }
}
