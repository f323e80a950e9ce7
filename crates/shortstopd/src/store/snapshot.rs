//! Partial store snapshots and their typed, forgiving views.
//!
//! A [`Snapshot`] is a bag of JSON values keyed by store key, exactly what
//! `get` returns and `set` accepts. Typed accessors never fail: absent keys
//! yield defaults and malformed values (a number where a map belongs, a
//! string inside a URL list) are coerced to the empty default with a
//! warning.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use shortstop_core::{DailyStats, DayKey, SessionRecord, Settings, ViewingState};

use super::keys;

// ============================================================================
// Snapshot
// ============================================================================

/// A partial view of the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    values: Map<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Sets `key` to the serialized form of `value`.
    ///
    /// Values that fail to serialize are logged and skipped.
    pub fn put<T: Serialize>(&mut self, key: &str, value: T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.values.insert(key.to_string(), v);
            }
            Err(e) => warn!(key, error = %e, "Failed to serialize store value, skipping"),
        }
    }

    pub fn put_value(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Merges `other` into this snapshot, `other` winning per key.
    pub fn merge(&mut self, other: Snapshot) {
        self.values.extend(other.values);
    }

    // ------------------------------------------------------------------------
    // Scalars
    // ------------------------------------------------------------------------

    pub fn u64_or(&self, key: &str, default: u64) -> u64 {
        match self.values.get(key) {
            None | Some(Value::Null) => default,
            Some(value) => as_count(value).unwrap_or_else(|| {
                warn!(key, value = %value, "Malformed counter in store, using default");
                default
            }),
        }
    }

    pub fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => default,
            Some(Value::Bool(b)) => *b,
            Some(value) => {
                warn!(key, value = %value, "Malformed flag in store, using default");
                default
            }
        }
    }

    pub fn string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .map(ToString::to_string)
    }

    pub fn day_key(&self, key: &str) -> Option<DayKey> {
        let raw = self.string(key)?;
        match DayKey::parse(&raw) {
            Ok(day) => Some(day),
            Err(e) => {
                warn!(key, error = %e, "Malformed day key in store, ignoring");
                None
            }
        }
    }

    // ------------------------------------------------------------------------
    // Per-day tables
    // ------------------------------------------------------------------------

    /// Reads a `{DayKey: int}` table.
    pub fn day_counts(&self, key: &str) -> BTreeMap<DayKey, u64> {
        self.day_table(key, |value| as_count(value))
    }

    /// Reads a `{DayKey: [string]}` table.
    ///
    /// A day whose value is not an array reads as empty; non-string items
    /// are dropped.
    pub fn day_lists(&self, key: &str) -> BTreeMap<DayKey, Vec<String>> {
        self.day_table(key, |value| {
            Some(match value.as_array() {
                Some(items) => items
                    .iter()
                    .filter_map(|item| item.as_str().map(ToString::to_string))
                    .collect(),
                None => Vec::new(),
            })
        })
    }

    /// Reads a `{DayKey: [{timestamp, duration}]}` table.
    pub fn day_sessions(&self, key: &str) -> BTreeMap<DayKey, Vec<SessionRecord>> {
        self.day_table(key, |value| {
            Some(match value.as_array() {
                Some(items) => items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect(),
                None => Vec::new(),
            })
        })
    }

    fn day_table<T>(
        &self,
        key: &str,
        read: impl Fn(&Value) -> Option<T>,
    ) -> BTreeMap<DayKey, T> {
        let mut table = BTreeMap::new();
        let object = match self.values.get(key) {
            None | Some(Value::Null) => return table,
            Some(Value::Object(object)) => object,
            Some(other) => {
                warn!(key, kind = value_kind(other), "Store table is not a map, treating as empty");
                return table;
            }
        };

        for (raw_day, value) in object {
            let Ok(day) = DayKey::parse(raw_day) else {
                warn!(key, day = %raw_day, "Skipping malformed day key in store table");
                continue;
            };
            match read(value) {
                Some(entry) => {
                    table.insert(day, entry);
                }
                None => warn!(key, day = %raw_day, "Skipping malformed store table entry"),
            }
        }
        table
    }

    // ------------------------------------------------------------------------
    // Settings and session counters
    // ------------------------------------------------------------------------

    /// Reads settings, falling back to defaults field by field.
    pub fn settings(&self) -> Settings {
        let defaults = Settings::default();
        let redirect_threshold = match self.values.get(keys::REDIRECT_THRESHOLD) {
            None | Some(Value::Null) => defaults.redirect_threshold,
            Some(value) => value
                .as_i64()
                .and_then(|v| Settings::validate_threshold(v).ok())
                .unwrap_or_else(|| {
                    warn!(value = %value, "Malformed redirect threshold in store, using default");
                    defaults.redirect_threshold
                }),
        };

        Settings {
            redirect_enabled: self.bool_or(keys::ENABLE_REDIRECT, defaults.redirect_enabled),
            redirect_threshold,
            time_based_redirect_enabled: self.bool_or(
                keys::ENABLE_TIME_BASED_REDIRECT,
                defaults.time_based_redirect_enabled,
            ),
            custom_redirect_url: self
                .string(keys::CUSTOM_REDIRECT_URL)
                .filter(|url| !url.trim().is_empty())
                .unwrap_or(defaults.custom_redirect_url),
            last_active_date: self.day_key(keys::LAST_ACTIVE_DATE),
        }
    }

    pub fn put_settings(&mut self, settings: &Settings) {
        self.put(keys::ENABLE_REDIRECT, settings.redirect_enabled);
        self.put(keys::REDIRECT_THRESHOLD, settings.redirect_threshold);
        self.put(
            keys::ENABLE_TIME_BASED_REDIRECT,
            settings.time_based_redirect_enabled,
        );
        self.put(keys::CUSTOM_REDIRECT_URL, &settings.custom_redirect_url);
        match settings.last_active_date {
            Some(day) => self.put(keys::LAST_ACTIVE_DATE, day),
            None => self.put_value(keys::LAST_ACTIVE_DATE, Value::Null),
        }
    }

    /// Writes the live counters of `state`.
    pub fn put_session_counters(&mut self, state: &ViewingState) {
        self.put(keys::CURRENT_SESSION_TIME, state.session_watch_seconds);
        self.put(
            keys::CURRENT_SESSION_SHORTS_COUNT,
            state.current_session_item_count,
        );
        self.put(keys::WATCH_TIME_WINDOW, state.watch_time_window);
    }
}

fn as_count(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Stats Tables
// ============================================================================

/// The six per-day tables, decoded together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsTables {
    pub history: BTreeMap<DayKey, u64>,
    pub urls: BTreeMap<DayKey, Vec<String>>,
    pub skipped: BTreeMap<DayKey, u64>,
    pub skipped_urls: BTreeMap<DayKey, Vec<String>>,
    pub watch_time: BTreeMap<DayKey, u64>,
    pub sessions: BTreeMap<DayKey, Vec<SessionRecord>>,
}

impl StatsTables {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            history: snapshot.day_counts(keys::SHORTS_HISTORY),
            urls: snapshot.day_lists(keys::SHORTS_URLS),
            skipped: snapshot.day_counts(keys::SHORTS_SKIPPED),
            skipped_urls: snapshot.day_lists(keys::SKIPPED_URLS),
            watch_time: snapshot.day_counts(keys::SHORTS_WATCH_TIME),
            sessions: snapshot.day_sessions(keys::SESSION_TIMES),
        }
    }

    /// Aggregates for `day`; an empty entry if nothing was recorded.
    ///
    /// Counts that disagree with their URL lists (a hand-edited or
    /// half-written store) are realigned to the lists.
    pub fn stats_for(&self, day: DayKey) -> DailyStats {
        let mut stats = DailyStats {
            watched_count: self.history.get(&day).copied().unwrap_or(0),
            skipped_count: self.skipped.get(&day).copied().unwrap_or(0),
            watch_time_seconds: self.watch_time.get(&day).copied().unwrap_or(0),
            watched_urls: self.urls.get(&day).cloned().unwrap_or_default(),
            skipped_urls: self.skipped_urls.get(&day).cloned().unwrap_or_default(),
        };
        if stats.reconcile() {
            warn!(day = %day, "Day counts disagreed with URL lists, realigned");
        }
        stats
    }

    pub fn put_stats(&mut self, day: DayKey, stats: DailyStats) {
        self.history.insert(day, stats.watched_count);
        self.skipped.insert(day, stats.skipped_count);
        self.watch_time.insert(day, stats.watch_time_seconds);
        self.urls.insert(day, stats.watched_urls);
        self.skipped_urls.insert(day, stats.skipped_urls);
    }

    pub fn sessions_for(&self, day: DayKey) -> &[SessionRecord] {
        self.sessions.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn push_session(&mut self, day: DayKey, record: SessionRecord) {
        self.sessions.entry(day).or_default().push(record);
    }

    /// Deletes every table entry for `days`. Returns how many entries went.
    pub fn remove_days(&mut self, days: &[DayKey]) -> usize {
        let mut removed = 0;
        for day in days {
            removed += usize::from(self.history.remove(day).is_some());
            removed += usize::from(self.urls.remove(day).is_some());
            removed += usize::from(self.skipped.remove(day).is_some());
            removed += usize::from(self.skipped_urls.remove(day).is_some());
            removed += usize::from(self.watch_time.remove(day).is_some());
            removed += usize::from(self.sessions.remove(day).is_some());
        }
        removed
    }

    /// Every day with any recorded entry.
    pub fn recorded_days(&self) -> Vec<DayKey> {
        let mut days: Vec<DayKey> = self
            .history
            .keys()
            .chain(self.skipped.keys())
            .chain(self.urls.keys())
            .copied()
            .collect();
        days.sort();
        days.dedup();
        days
    }

    /// Encodes all six tables for a `set`.
    pub fn to_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.put(keys::SHORTS_HISTORY, &self.history);
        snapshot.put(keys::SHORTS_URLS, &self.urls);
        snapshot.put(keys::SHORTS_SKIPPED, &self.skipped);
        snapshot.put(keys::SKIPPED_URLS, &self.skipped_urls);
        snapshot.put(keys::SHORTS_WATCH_TIME, &self.watch_time);
        snapshot.put(keys::SESSION_TIMES, &self.sessions);
        snapshot
    }

    /// Encodes only the watch time table, for writes that touch nothing else.
    pub fn watch_time_snapshot(&self) -> Snapshot {
        let mut snapshot = Snapshot::new();
        snapshot.put(keys::SHORTS_WATCH_TIME, &self.watch_time);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> Snapshot {
        match value {
            Value::Object(map) => Snapshot::from_map(map),
            _ => panic!("test snapshot must be an object"),
        }
    }

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    #[test]
    fn test_missing_keys_read_as_defaults() {
        let empty = Snapshot::new();
        assert!(empty.day_counts(keys::SHORTS_HISTORY).is_empty());
        assert_eq!(empty.u64_or(keys::CURRENT_SESSION_TIME, 0), 0);
        assert_eq!(empty.settings(), Settings::default());
    }

    #[test]
    fn test_malformed_values_are_coerced() {
        let snap = snapshot(json!({
            "shortsHistory": "not a map",
            "shortsUrls": {"2026-10-05": "not a list", "garbage-day": ["/shorts/x"]},
            "skippedUrls": {"2026-10-05": ["/shorts/a", 7, "/shorts/b"]},
            "redirectThreshold": 0,
            "enableRedirect": "yes",
            "currentSessionTime": -4,
        }));

        assert!(snap.day_counts(keys::SHORTS_HISTORY).is_empty());

        let urls = snap.day_lists(keys::SHORTS_URLS);
        assert_eq!(urls.len(), 1);
        assert_eq!(urls.get(&day("2026-10-05")), Some(&Vec::new()));

        let skipped = snap.day_lists(keys::SKIPPED_URLS);
        assert_eq!(
            skipped.get(&day("2026-10-05")).unwrap(),
            &vec!["/shorts/a".to_string(), "/shorts/b".to_string()]
        );

        let settings = snap.settings();
        assert_eq!(settings.redirect_threshold, 5);
        assert!(!settings.redirect_enabled);
        assert_eq!(snap.u64_or(keys::CURRENT_SESSION_TIME, 0), 0);
    }

    #[test]
    fn test_tables_roundtrip_through_snapshot() {
        let mut tables = StatsTables::default();
        let today = day("2026-10-05");
        let mut stats = tables.stats_for(today);
        stats.record_watched("/shorts/a");
        stats.record_skipped("/shorts/b");
        tables.put_stats(today, stats.clone());
        tables.push_session(today, SessionRecord::new("09:15", 42));

        let decoded = StatsTables::from_snapshot(&tables.to_snapshot());
        assert_eq!(decoded.stats_for(today), stats);
        assert_eq!(decoded.sessions_for(today).len(), 1);
    }

    #[test]
    fn test_watch_time_snapshot_leaves_other_tables_out() {
        let mut tables = StatsTables::default();
        let today = day("2026-10-05");
        let mut stats = tables.stats_for(today);
        stats.record_watched("/shorts/a");
        stats.add_watch_time(12);
        tables.put_stats(today, stats);

        let snap = tables.watch_time_snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap.day_counts(keys::SHORTS_WATCH_TIME).get(&today), Some(&12));
        assert!(snap.get(keys::SHORTS_URLS).is_none());
    }

    #[test]
    fn test_remove_days_twice_is_harmless() {
        let mut tables = StatsTables::default();
        let today = day("2026-10-05");
        let mut stats = DailyStats::default();
        stats.record_watched("/shorts/a");
        tables.put_stats(today, stats);

        assert!(tables.remove_days(&[today]) > 0);
        assert_eq!(tables.remove_days(&[today]), 0);
        assert!(tables.stats_for(today).is_empty());
    }
}
