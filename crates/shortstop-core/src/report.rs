//! Read-only views handed to presentation surfaces.
//!
//! These are precomputed so the popup chart and the export button only
//! render; they never aggregate.

use serde::{Deserialize, Serialize};

use crate::day::DayKey;

/// Today's headline numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySummary {
    pub day: Option<DayKey>,
    pub watched: u64,
    pub skipped: u64,
    pub watch_time_seconds: u64,
    pub session_time_seconds: u64,
    pub session_item_count: u32,
}

/// Seven-day bar chart series, oldest day first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySeries {
    pub days: Vec<DayKey>,
    pub labels: Vec<String>,
    pub watched: Vec<u64>,
    pub skipped: Vec<u64>,
    pub watch_time_seconds: Vec<u64>,
    /// Sessions started in each hour of the day across the week.
    pub sessions_by_hour: Vec<u32>,
}

/// Export file contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    /// One entry per recorded day, newest first.
    pub daily_stats: Vec<ExportDay>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// RFC 3339 timestamp of the export
    pub export_date: String,
    pub total_days: usize,
    pub total_shorts_watched: u64,
    pub total_shorts_skipped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDay {
    pub date: DayKey,
    pub formatted_date: String,
    pub watched: u64,
    pub skipped: u64,
    pub urls: Vec<String>,
}

impl ExportDocument {
    /// Default download file name for an export taken on `day`.
    pub fn file_name(day: DayKey) -> String {
        format!("youtube-shorts-stats-{day}.json")
    }
}
