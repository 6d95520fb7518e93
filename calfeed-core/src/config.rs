//! calfeed configuration.
//!
//! A single TOML file lists the calendars to follow and how the merged view
//! behaves. `CALFEED_*` environment variables override top-level keys.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::aggregator::{CalendarFormat, StartDate, ViewSettings};
use crate::constants::{
    DEFAULT_FETCH_INTERVAL_MS, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_MAXIMUM_ENTRIES,
    DEFAULT_MAXIMUM_NUMBER_OF_DAYS, DEFAULT_USER_AGENT,
};
use crate::date_window::parse_date_start;
use crate::error::{CalFeedError, CalFeedResult};
use crate::source::{Auth, SourceDescriptor, normalize_feed_url};

fn default_maximum_entries() -> usize {
    DEFAULT_MAXIMUM_ENTRIES
}

fn default_maximum_number_of_days() -> u32 {
    DEFAULT_MAXIMUM_NUMBER_OF_DAYS
}

fn default_fetch_interval_ms() -> u64 {
    DEFAULT_FETCH_INTERVAL_MS
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT_MS
}

fn default_start_date() -> String {
    "today".to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Top-level configuration at ~/.config/calfeed/config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Entries in the merged view.
    #[serde(default = "default_maximum_entries")]
    pub maximum_entries: usize,

    #[serde(default = "default_maximum_number_of_days")]
    pub maximum_number_of_days: u32,

    #[serde(default = "default_fetch_interval_ms")]
    pub fetch_interval_ms: u64,

    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default)]
    pub hide_private: bool,

    /// "today", or YYYY-MM-DD to pin the view to a fixed day.
    #[serde(default = "default_start_date")]
    pub start_date: String,

    #[serde(default)]
    pub calendar_format: CalendarFormat,

    /// IANA zone used for "today", all-day and floating events.
    #[serde(default)]
    pub timezone: Option<String>,

    #[serde(default)]
    pub excluded_events: Vec<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default)]
    pub calendars: Vec<CalendarEntry>,
}

/// One `[[calendars]]` table. Unset limits fall back to the global ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub url: String,
    pub maximum_entries: Option<usize>,
    pub maximum_number_of_days: Option<u32>,
    pub fetch_interval_ms: Option<u64>,
    pub excluded_events: Option<Vec<String>>,
    pub auth: Option<Auth>,
    /// Older configs put credentials directly on the calendar.
    pub user: Option<String>,
    pub pass: Option<String>,
}

impl CalendarEntry {
    fn auth(&self) -> Option<Auth> {
        if let Some(auth) = &self.auth {
            return Some(auth.clone());
        }
        match (&self.user, &self.pass) {
            (Some(user), Some(pass)) => Some(Auth {
                user: user.clone(),
                pass: pass.clone(),
            }),
            _ => None,
        }
    }
}

impl FeedConfig {
    pub fn config_path() -> CalFeedResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CalFeedError::Config("Could not determine config directory".into()))?
            .join("calfeed");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location, creating a commented template first
    /// if nothing is there yet.
    pub fn load() -> CalFeedResult<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            Self::create_default_config(&path)?;
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> CalFeedResult<Self> {
        if !path.exists() {
            return Err(CalFeedError::Config(format!(
                "Config file not found at {}",
                path.display()
            )));
        }

        Config::builder()
            .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml))
            .add_source(Environment::with_prefix("CALFEED"))
            .build()
            .map_err(|e| CalFeedError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| CalFeedError::Config(e.to_string()))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> CalFeedResult<()> {
        let contents = format!(
            "\
# calfeed configuration

# Entries shown in the merged agenda:
# maximum_entries = {DEFAULT_MAXIMUM_ENTRIES}

# How many days ahead each calendar is read:
# maximum_number_of_days = {DEFAULT_MAXIMUM_NUMBER_OF_DAYS}

# Poll interval and request timeout, in milliseconds:
# fetch_interval_ms = {DEFAULT_FETCH_INTERVAL_MS}
# fetch_timeout_ms = {DEFAULT_FETCH_TIMEOUT_MS}

# hide_private = false
# start_date = \"today\"
# calendar_format = \"list\"
# timezone = \"Europe/Amsterdam\"
# excluded_events = [\"Cancelled\"]

# [[calendars]]
# url = \"webcal://example.com/holidays.ics\"
# maximum_entries = 5
# auth = {{ user = \"me\", pass = \"secret\" }}
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalFeedError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| CalFeedError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    pub fn timezone(&self) -> CalFeedResult<Tz> {
        match &self.timezone {
            Some(name) => name
                .parse::<Tz>()
                .map_err(|_| CalFeedError::Config(format!("Unknown timezone '{name}'"))),
            None => Ok(iana_time_zone::get_timezone()
                .ok()
                .and_then(|name| name.parse::<Tz>().ok())
                .unwrap_or(Tz::UTC)),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn view_settings(&self) -> CalFeedResult<ViewSettings> {
        let timezone = self.timezone()?;
        let start_date = match self.start_date.trim() {
            "" | "today" => StartDate::Today,
            fixed => StartDate::Fixed(
                parse_date_start(fixed, &timezone).map_err(CalFeedError::Config)?,
            ),
        };

        Ok(ViewSettings {
            maximum_entries: self.maximum_entries,
            hide_private: self.hide_private,
            start_date,
            calendar_format: self.calendar_format,
            timezone,
        })
    }

    /// Descriptors in configuration order, windows starting at `start`.
    /// `webcal://` URLs come out as `http://`.
    pub fn source_descriptors(&self, start: DateTime<Utc>) -> Vec<SourceDescriptor> {
        self.calendars
            .iter()
            .map(|entry| SourceDescriptor {
                source_id: normalize_feed_url(&entry.url),
                fetch_interval_ms: entry.fetch_interval_ms.unwrap_or(self.fetch_interval_ms),
                max_entries: entry.maximum_entries.unwrap_or(self.maximum_entries),
                max_window_days: entry
                    .maximum_number_of_days
                    .unwrap_or(self.maximum_number_of_days),
                auth: entry.auth(),
                start_date: start,
                excluded_events: entry
                    .excluded_events
                    .clone()
                    .unwrap_or_else(|| self.excluded_events.clone()),
            })
            .collect()
    }
}

/// Expand `~` in a user-supplied path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
