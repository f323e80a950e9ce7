//! Calendar-day partition keys and the clock they are derived from.
//!
//! Every per-day aggregate is keyed by a [`DayKey`] computed from local
//! wall-clock time. The [`Clock`] trait lets the daemon swap the system
//! clock for a [`ManualClock`] in tests that cross midnight.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Wire format of a day key.
const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Day Key
// ============================================================================

/// Calendar date identifier (`YYYY-MM-DD`) in the local timezone.
///
/// Serialized as its string form so it can be used as a JSON object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DayKey(NaiveDate);

impl DayKey {
    /// Creates a day key from a calendar date.
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Derives the day key for a local timestamp.
    pub fn from_datetime(at: &DateTime<Local>) -> Self {
        Self(at.date_naive())
    }

    /// Today's day key according to `clock`.
    pub fn today(clock: &dyn Clock) -> Self {
        Self::from_datetime(&clock.now())
    }

    /// Parses a `YYYY-MM-DD` string.
    pub fn parse(value: &str) -> DomainResult<Self> {
        NaiveDate::parse_from_str(value.trim(), DAY_KEY_FORMAT)
            .map(Self)
            .map_err(|_| DomainError::InvalidDayKey {
                value: value.to_string(),
            })
    }

    /// Returns the underlying date.
    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// The day before this one.
    #[must_use]
    pub fn previous(&self) -> Self {
        self.0.pred_opt().map(Self).unwrap_or(*self)
    }

    /// Returns true if `last_active` is absent or names a different day.
    ///
    /// A missing last-active date counts as a rollover: the badge is
    /// cleared and session counters start from zero.
    pub fn is_rollover_from(&self, last_active: Option<&DayKey>) -> bool {
        last_active != Some(self)
    }

    /// Short chart label, e.g. `Mon 05.10` (weekday, day, month).
    pub fn chart_label(&self) -> String {
        format!(
            "{} {:02}.{:02}",
            self.0.weekday(),
            self.0.day(),
            self.0.month()
        )
    }

    /// Long label used in exports, e.g. `Mon, 10/05/2026`.
    pub fn export_label(&self) -> String {
        self.0.format("%a, %m/%d/%Y").to_string()
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_KEY_FORMAT))
    }
}

impl FromStr for DayKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DayKey> for String {
    fn from(key: DayKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for DayKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// The last `n` days ending at `today`, oldest first.
pub fn last_n_days(today: DayKey, n: usize) -> Vec<DayKey> {
    let mut days: Vec<DayKey> = (0..n)
        .filter_map(|offset| {
            let back = i64::try_from(offset).ok()?;
            today.0.checked_sub_signed(Duration::days(back)).map(DayKey)
        })
        .collect();
    days.reverse();
    days
}

/// Wall-clock start label for session records (`HH:MM`, 24-hour).
pub fn clock_label(at: &DateTime<Local>) -> String {
    at.format("%H:%M").to_string()
}

// ============================================================================
// Clock
// ============================================================================

/// Source of local wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current local time.
    fn now(&self) -> DateTime<Local>;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: DateTime<Local>) {
        if let Ok(mut now) = self.now.lock() {
            *now = at;
        }
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn test_day_key_roundtrips_through_string() {
        let key = DayKey::parse("2026-10-05").unwrap();
        assert_eq!(key.to_string(), "2026-10-05");
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"2026-10-05\"");
        let back: DayKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_day_key_rejects_garbage() {
        assert!(DayKey::parse("05/10/2026").is_err());
        assert!(serde_json::from_str::<DayKey>("\"not-a-day\"").is_err());
    }

    #[test]
    fn test_rollover_detection() {
        let today = DayKey::parse("2026-10-05").unwrap();
        assert!(!today.is_rollover_from(Some(&today)));
        assert!(today.is_rollover_from(Some(&today.previous())));
        assert!(today.is_rollover_from(None));
    }

    #[test]
    fn test_last_n_days_is_oldest_first() {
        let today = DayKey::parse("2026-03-02").unwrap();
        let days: Vec<String> = last_n_days(today, 3)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(days, vec!["2026-02-28", "2026-03-01", "2026-03-02"]);
    }

    #[test]
    fn test_labels() {
        let key = DayKey::parse("2026-10-05").unwrap();
        assert_eq!(key.chart_label(), "Mon 05.10");
        assert_eq!(key.export_label(), "Mon, 10/05/2026");
        assert_eq!(clock_label(&local(2026, 10, 5, 7, 4)), "07:04");
    }

    #[test]
    fn test_manual_clock_crosses_midnight() {
        let clock = ManualClock::new(local(2026, 10, 5, 23, 59));
        let before = DayKey::today(&clock);
        clock.advance(Duration::minutes(2));
        let after = DayKey::today(&clock);
        assert_eq!(after.previous(), before);
    }
}
