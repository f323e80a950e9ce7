//! Precomputed read models for the popup and the export button.

use chrono::{DateTime, Local};

use shortstop_core::{
    last_n_days, DayKey, ExportDay, ExportDocument, ExportMetadata, TodaySummary, ViewingState,
    WeeklySeries,
};

use crate::store::StatsTables;

/// Days shown in the weekly chart and cleared by a recent-stats reset.
pub const RECENT_DAYS: usize = 7;

pub fn today_summary(tables: &StatsTables, today: DayKey, state: &ViewingState) -> TodaySummary {
    let stats = tables.stats_for(today);
    TodaySummary {
        day: Some(today),
        watched: stats.watched_count,
        skipped: stats.skipped_count,
        watch_time_seconds: stats.watch_time_seconds,
        session_time_seconds: state.session_watch_seconds,
        session_item_count: state.current_session_item_count,
    }
}

/// Chart series for the seven days ending at `today`, oldest first.
pub fn weekly_series(tables: &StatsTables, today: DayKey) -> WeeklySeries {
    let days = last_n_days(today, RECENT_DAYS);
    let mut series = WeeklySeries {
        sessions_by_hour: vec![0; 24],
        ..Default::default()
    };

    for day in &days {
        let stats = tables.stats_for(*day);
        series.labels.push(day.chart_label());
        series.watched.push(stats.watched_count);
        series.skipped.push(stats.skipped_count);
        series.watch_time_seconds.push(stats.watch_time_seconds);

        for record in tables.sessions_for(*day) {
            let slot = record
                .hour()
                .and_then(|h| usize::try_from(h).ok())
                .and_then(|h| series.sessions_by_hour.get_mut(h));
            if let Some(slot) = slot {
                *slot = slot.saturating_add(1);
            }
        }
    }

    series.days = days;
    series
}

/// Every recorded day, newest first, with totals.
pub fn export_document(tables: &StatsTables, now: DateTime<Local>) -> ExportDocument {
    let mut days = tables.recorded_days();
    days.reverse();

    let daily_stats: Vec<ExportDay> = days
        .into_iter()
        .map(|day| {
            let stats = tables.stats_for(day);
            ExportDay {
                date: day,
                formatted_date: day.export_label(),
                watched: stats.watched_count,
                skipped: stats.skipped_count,
                urls: stats.watched_urls,
            }
        })
        .collect();

    ExportDocument {
        metadata: ExportMetadata {
            export_date: now.to_rfc3339(),
            total_days: daily_stats.len(),
            total_shorts_watched: daily_stats.iter().map(|d| d.watched).sum(),
            total_shorts_skipped: daily_stats.iter().map(|d| d.skipped).sum(),
        },
        daily_stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortstop_core::{DailyStats, SessionRecord};

    fn day(s: &str) -> DayKey {
        DayKey::parse(s).unwrap()
    }

    fn tables_with(entries: &[(&str, u64, u64)]) -> StatsTables {
        let mut tables = StatsTables::default();
        for (d, watched, skipped) in entries {
            let mut stats = DailyStats::default();
            for i in 0..*watched {
                stats.record_watched(format!("/shorts/w{i}"));
            }
            for i in 0..*skipped {
                stats.record_skipped(format!("/shorts/s{i}"));
            }
            tables.put_stats(day(d), stats);
        }
        tables
    }

    #[test]
    fn test_weekly_series_fills_gaps_with_zero() {
        let mut tables = tables_with(&[("2026-10-05", 3, 1), ("2026-10-01", 2, 0)]);
        tables.push_session(day("2026-10-05"), SessionRecord::new("21:10", 60));
        tables.push_session(day("2026-10-04"), SessionRecord::new("21:45", 30));

        let series = weekly_series(&tables, day("2026-10-05"));

        assert_eq!(series.days.len(), 7);
        assert_eq!(series.days.first(), Some(&day("2026-09-29")));
        assert_eq!(series.labels.last().map(String::as_str), Some("Mon 05.10"));
        assert_eq!(series.watched, vec![0, 0, 2, 0, 0, 0, 3]);
        assert_eq!(series.skipped, vec![0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(series.sessions_by_hour[21], 2);
    }

    #[test]
    fn test_export_is_newest_first_with_totals() {
        let tables = tables_with(&[("2026-10-03", 1, 2), ("2026-10-05", 4, 0)]);
        let doc = export_document(&tables, Local::now());

        assert_eq!(doc.metadata.total_days, 2);
        assert_eq!(doc.metadata.total_shorts_watched, 5);
        assert_eq!(doc.metadata.total_shorts_skipped, 2);
        assert_eq!(doc.daily_stats[0].date, day("2026-10-05"));
        assert_eq!(doc.daily_stats[0].urls.len(), 4);
        assert_eq!(doc.daily_stats[1].formatted_date, "Sat, 10/03/2026");
    }

    #[test]
    fn test_today_summary_includes_live_counters() {
        let tables = tables_with(&[("2026-10-05", 2, 1)]);
        let state = ViewingState {
            session_watch_seconds: 42,
            current_session_item_count: 2,
            ..Default::default()
        };
        let summary = today_summary(&tables, day("2026-10-05"), &state);
        assert_eq!(summary.watched, 2);
        assert_eq!(summary.session_time_seconds, 42);
        assert_eq!(summary.session_item_count, 2);
    }
}
