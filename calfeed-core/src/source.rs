//! Calendar feed descriptors.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::date_window::DateWindow;
use crate::error::{CalFeedError, CalFeedResult};

/// HTTP basic credentials for a feed.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auth {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

/// One configured feed. The URL doubles as the source ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub fetch_interval_ms: u64,
    pub max_entries: usize,
    pub max_window_days: u32,
    pub auth: Option<Auth>,
    /// Initial window start; the aggregator advances it afterwards.
    pub start_date: DateTime<Utc>,
    /// Titles containing any of these (case-insensitive) are dropped.
    #[serde(default)]
    pub excluded_events: Vec<String>,
}

impl SourceDescriptor {
    pub fn url(&self) -> &str {
        &self.source_id
    }

    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms.max(1))
    }

    pub fn initial_window(&self) -> DateWindow {
        DateWindow::new(self.start_date, self.max_window_days)
    }

    /// Check that the source ID is an absolute http(s) URL.
    pub fn validate(&self) -> CalFeedResult<Url> {
        parse_feed_url(&self.source_id)
    }

    pub fn is_excluded(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.excluded_events
            .iter()
            .filter(|needle| !needle.is_empty())
            .any(|needle| title.contains(&needle.to_lowercase()))
    }
}

/// `webcal://` is plain HTTP as far as fetching goes.
pub fn normalize_feed_url(url: &str) -> String {
    let trimmed = url.trim();
    match trimmed.strip_prefix("webcal://") {
        Some(rest) => format!("http://{}", rest),
        None => trimmed.to_string(),
    }
}

pub fn parse_feed_url(url: &str) -> CalFeedResult<Url> {
    let parsed = Url::parse(url).map_err(|e| CalFeedError::InvalidSourceUrl(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" if parsed.has_host() => Ok(parsed),
        scheme => Err(CalFeedError::InvalidSourceUrl(format!(
            "{url}: unsupported scheme '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn descriptor(url: &str) -> SourceDescriptor {
        SourceDescriptor {
            source_id: url.to_string(),
            fetch_interval_ms: 60_000,
            max_entries: 10,
            max_window_days: 30,
            auth: None,
            start_date: Utc.with_ymd_and_hms(2025, 3, 20, 0, 0, 0).unwrap(),
            excluded_events: vec!["Birthday".into()],
        }
    }

    #[test]
    fn webcal_is_rewritten_to_http() {
        assert_eq!(
            normalize_feed_url("webcal://example.com/holidays.ics"),
            "http://example.com/holidays.ics"
        );
        assert_eq!(
            normalize_feed_url(" https://example.com/a.ics "),
            "https://example.com/a.ics"
        );
    }

    #[test]
    fn validation_requires_http_urls() {
        assert!(descriptor("https://example.com/a.ics").validate().is_ok());
        assert!(descriptor("http://localhost:8080/a.ics").validate().is_ok());

        for bad in ["not a url", "ftp://example.com/a.ics", "/relative/path.ics", "mailto:me@example.com"] {
            let err = descriptor(bad).validate().unwrap_err();
            assert!(matches!(err, CalFeedError::InvalidSourceUrl(_)), "{bad}");
        }
    }

    #[test]
    fn exclusion_is_case_insensitive() {
        let d = descriptor("https://example.com/a.ics");
        assert!(d.is_excluded("Anna's birthday"));
        assert!(!d.is_excluded("Dentist"));
    }

    #[test]
    fn auth_debug_hides_password() {
        let auth = Auth {
            user: "alice".into(),
            pass: "hunter2".into(),
        };
        let shown = format!("{auth:?}");
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }
}
