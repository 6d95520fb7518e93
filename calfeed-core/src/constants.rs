/// Total number of entries in the merged view.
pub const DEFAULT_MAXIMUM_ENTRIES: usize = 10;

/// How far ahead of the window start a feed is read.
pub const DEFAULT_MAXIMUM_NUMBER_OF_DAYS: u32 = 365;

/// Five minutes between polls of the same feed.
pub const DEFAULT_FETCH_INTERVAL_MS: u64 = 5 * 60 * 1000;

pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30 * 1000;

pub const DEFAULT_USER_AGENT: &str = concat!("calfeed/", env!("CARGO_PKG_VERSION"));

/// Upper bound on instances generated from a single RRULE.
pub const MAX_RECURRENCE_INSTANCES: u16 = 365;
