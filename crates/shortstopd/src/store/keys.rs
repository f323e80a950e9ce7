//! Persisted key names.
//!
//! One flat namespace, the same one the extension's local storage uses, so
//! a store file can be imported from or inspected next to a browser
//! profile.

/// `{DayKey: int}` watched count per day
pub const SHORTS_HISTORY: &str = "shortsHistory";
/// `{DayKey: [string]}` watched URLs per day
pub const SHORTS_URLS: &str = "shortsUrls";
/// `{DayKey: int}` skipped count per day
pub const SHORTS_SKIPPED: &str = "shortsSkipped";
/// `{DayKey: [string]}` skipped URLs per day
pub const SKIPPED_URLS: &str = "skippedUrls";
/// `{DayKey: int}` watch-time seconds per day
pub const SHORTS_WATCH_TIME: &str = "shortsWatchTime";
/// `{DayKey: [{timestamp, duration}]}` finished sessions per day
pub const SESSION_TIMES: &str = "sessionTimes";

/// Live session watch time in seconds
pub const CURRENT_SESSION_TIME: &str = "currentSessionTime";
/// Confirmed views since the last session start or count intervention
pub const CURRENT_SESSION_SHORTS_COUNT: &str = "currentSessionShortsCount";
/// Seconds accumulated toward the next time intervention
pub const WATCH_TIME_WINDOW: &str = "watchTimeWindow";
/// Wall-clock start of the open session (`HH:MM`)
pub const SESSION_START_TIME: &str = "sessionStartTime";

pub const REDIRECT_THRESHOLD: &str = "redirectThreshold";
pub const ENABLE_REDIRECT: &str = "enableRedirect";
pub const ENABLE_TIME_BASED_REDIRECT: &str = "enableTimeBasedRedirect";
pub const CUSTOM_REDIRECT_URL: &str = "customRedirectUrl";
pub const LAST_ACTIVE_DATE: &str = "lastActiveDate";

/// Every per-day table.
pub const DAILY_TABLES: [&str; 6] = [
    SHORTS_HISTORY,
    SHORTS_URLS,
    SHORTS_SKIPPED,
    SKIPPED_URLS,
    SHORTS_WATCH_TIME,
    SESSION_TIMES,
];

/// Settings keys.
pub const SETTINGS: [&str; 5] = [
    REDIRECT_THRESHOLD,
    ENABLE_REDIRECT,
    ENABLE_TIME_BASED_REDIRECT,
    CUSTOM_REDIRECT_URL,
    LAST_ACTIVE_DATE,
];

/// Live session counters.
pub const SESSION_COUNTERS: [&str; 3] = [
    CURRENT_SESSION_TIME,
    CURRENT_SESSION_SHORTS_COUNT,
    WATCH_TIME_WINDOW,
];

/// Everything a counter mutation needs to read.
pub fn mutation_keys() -> Vec<&'static str> {
    DAILY_TABLES
        .iter()
        .chain(SETTINGS.iter())
        .chain(SESSION_COUNTERS.iter())
        .copied()
        .collect()
}
