//! Error types for calfeed.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading configuration or polling feeds.
#[derive(Error, Debug)]
pub enum CalFeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid calendar URL: {0}")]
    InvalidSourceUrl(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Fetching {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Fetch timed out after {}", humantime::format_duration(*.0))]
    FetchTimeout(Duration),

    #[error("ICS parse error: {0}")]
    IcsParse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CalFeedError {
    /// Whether the next scheduled poll may succeed where this one failed.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CalFeedError::Config(_) | CalFeedError::InvalidSourceUrl(_))
    }
}

impl From<reqwest::Error> for CalFeedError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => CalFeedError::HttpStatus {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            },
            None => CalFeedError::Http(err.to_string()),
        }
    }
}

/// Result type alias for calfeed operations.
pub type CalFeedResult<T> = Result<T, CalFeedError>;
