//! Per-day aggregates and session records.

use serde::{Deserialize, Serialize};

/// Aggregates for one calendar day.
///
/// Counts and URL lists move together: every recorded view appends its
/// URL, so `watched_count == watched_urls.len()` holds for every entry the
/// aggregator writes (and likewise for skips).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub watched_count: u64,
    pub skipped_count: u64,
    pub watch_time_seconds: u64,
    pub watched_urls: Vec<String>,
    pub skipped_urls: Vec<String>,
}

impl DailyStats {
    /// Records a confirmed view and returns the new watched count.
    pub fn record_watched(&mut self, url: impl Into<String>) -> u64 {
        self.watched_urls.push(url.into());
        self.watched_count = self.watched_count.saturating_add(1);
        self.watched_count
    }

    /// Records a skipped item and returns the new skipped count.
    pub fn record_skipped(&mut self, url: impl Into<String>) -> u64 {
        self.skipped_urls.push(url.into());
        self.skipped_count = self.skipped_count.saturating_add(1);
        self.skipped_count
    }

    /// Adds watch time and returns the new daily total.
    pub fn add_watch_time(&mut self, seconds: u64) -> u64 {
        self.watch_time_seconds = self.watch_time_seconds.saturating_add(seconds);
        self.watch_time_seconds
    }

    /// True if counts agree with their URL lists.
    pub fn is_consistent(&self) -> bool {
        usize::try_from(self.watched_count).ok() == Some(self.watched_urls.len())
            && usize::try_from(self.skipped_count).ok() == Some(self.skipped_urls.len())
    }

    /// Realigns counts with their URL lists, the lists being authoritative.
    ///
    /// Returns true if anything changed.
    pub fn reconcile(&mut self) -> bool {
        let watched = self.watched_urls.len() as u64;
        let skipped = self.skipped_urls.len() as u64;
        let changed = self.watched_count != watched || self.skipped_count != skipped;
        self.watched_count = watched;
        self.skipped_count = skipped;
        changed
    }

    /// True if nothing has been recorded for the day.
    pub fn is_empty(&self) -> bool {
        self.watched_count == 0
            && self.skipped_count == 0
            && self.watch_time_seconds == 0
            && self.watched_urls.is_empty()
            && self.skipped_urls.is_empty()
    }
}

/// One finished viewing session, kept for hour-of-day histograms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Wall-clock start, `HH:MM`
    pub timestamp: String,
    /// Session length in seconds
    pub duration: u64,
}

impl SessionRecord {
    pub fn new(timestamp: impl Into<String>, duration: u64) -> Self {
        Self {
            timestamp: timestamp.into(),
            duration,
        }
    }

    /// Hour of day parsed from the timestamp, if well formed.
    pub fn hour(&self) -> Option<u32> {
        self.timestamp
            .split(':')
            .next()
            .and_then(|h| h.parse().ok())
            .filter(|h| *h < 24)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_watched_keeps_counts_and_urls_aligned() {
        let mut stats = DailyStats::default();
        assert_eq!(stats.record_watched("/shorts/a"), 1);
        assert_eq!(stats.record_watched("/shorts/b"), 2);
        assert_eq!(stats.record_skipped("/shorts/c"), 1);
        assert!(stats.is_consistent());
        assert_eq!(stats.watched_urls, vec!["/shorts/a", "/shorts/b"]);
    }

    #[test]
    fn test_inconsistent_stats_detected() {
        let stats = DailyStats {
            watched_count: 2,
            watched_urls: vec!["/shorts/a".to_string()],
            ..Default::default()
        };
        assert!(!stats.is_consistent());
    }

    #[test]
    fn test_reconcile_trusts_url_lists() {
        let mut stats = DailyStats {
            watched_count: 7,
            watched_urls: vec!["/shorts/a".to_string(), "/shorts/b".to_string()],
            ..Default::default()
        };
        assert!(stats.reconcile());
        assert_eq!(stats.watched_count, 2);
        assert!(stats.is_consistent());
        assert!(!stats.reconcile());
    }

    #[test]
    fn test_session_record_hour() {
        assert_eq!(SessionRecord::new("21:05", 30).hour(), Some(21));
        assert_eq!(SessionRecord::new("garbage", 30).hour(), None);
        assert_eq!(SessionRecord::new("25:00", 30).hour(), None);
    }
}
