//! Aggregator actor - owns the viewing state and every counter mutation.
//!
//! Commands are processed one at a time. Each handler reads what it needs
//! from the store, mutates, and writes back before the next command is
//! taken, so two mutations never interleave and no increment is lost.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Store write failures are reported to the caller and logged
//! - Reply send failures (caller went away) are ignored

use std::sync::Arc;

use chrono::{DateTime, Local};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use shortstop_core::{
    clock_label, last_n_days, Clock, DayKey, ExportDocument, Intervention, SessionRecord,
    Settings, SettingsUpdate, TodaySummary, ViewEvent, ViewingState, WeeklySeries,
    TIME_THRESHOLD_SECS,
};

use super::commands::{AggregatorCommand, AggregatorError, DaemonEvent};
use crate::stats::{self, RECENT_DAYS};
use crate::store::{keys, SharedStore, Snapshot, StatsTables};
use crate::surface::InterventionDispatcher;

// ============================================================================
// Mutation Context
// ============================================================================

/// Everything one mutating handler reads, plus what it will write back.
struct Mutation {
    today: DayKey,
    now: DateTime<Local>,
    settings: Settings,
    tables: StatsTables,
    rolled_over: bool,
    /// Extra keys written alongside the mutation
    extra: Snapshot,
}

/// Which per-day tables a commit writes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableWrite {
    /// Nothing in the tables changed
    Untouched,
    /// Only `shortsWatchTime` changed
    WatchTime,
    All,
}

/// Side effects collected while handling a command, released once the
/// store write has been attempted.
///
/// `StatsChanged` is not among them: it follows from the store's own
/// change notifications (see [`super::spawn_aggregator`]).
#[derive(Default)]
struct Effects {
    badge: Option<String>,
    interventions: Vec<Intervention>,
}

// ============================================================================
// Aggregator Actor
// ============================================================================

/// The aggregator actor.
///
/// Owns the single [`ViewingState`]. Page observers and clients reach it
/// only through [`AggregatorCommand`]s.
pub struct AggregatorActor {
    receiver: mpsc::Receiver<AggregatorCommand>,
    store: SharedStore,
    clock: Arc<dyn Clock>,
    dispatcher: InterventionDispatcher,
    event_publisher: broadcast::Sender<DaemonEvent>,
    state: ViewingState,
}

impl AggregatorActor {
    pub fn new(
        receiver: mpsc::Receiver<AggregatorCommand>,
        store: SharedStore,
        clock: Arc<dyn Clock>,
        dispatcher: InterventionDispatcher,
        event_publisher: broadcast::Sender<DaemonEvent>,
    ) -> Self {
        Self {
            receiver,
            store,
            clock,
            dispatcher,
            event_publisher,
            state: ViewingState::default(),
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    pub async fn run(mut self) {
        info!("Aggregator actor starting");
        self.restore().await;

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            session_open = self.state.session_started_at.is_some(),
            "Aggregator actor stopped"
        );
    }

    /// Picks up same-day counters from the store and shows today's count.
    async fn restore(&mut self) {
        let snapshot = self.store.get(&keys::mutation_keys()).await;
        let settings = snapshot.settings();
        let today = DayKey::today(self.clock.as_ref());

        if !today.is_rollover_from(settings.last_active_date.as_ref()) {
            self.state.watch_time_window = snapshot.u64_or(keys::WATCH_TIME_WINDOW, 0);
            self.state.session_watch_seconds = snapshot.u64_or(keys::CURRENT_SESSION_TIME, 0);
        }

        let watched = StatsTables::from_snapshot(&snapshot)
            .stats_for(today)
            .watched_count;
        debug!(day = %today, watched, "Restored aggregator state");
        self.dispatcher.set_badge(&watched.to_string()).await;
    }

    async fn handle_command(&mut self, cmd: AggregatorCommand) {
        match cmd {
            AggregatorCommand::Apply { event, respond_to } => {
                let result = self.handle_event(event).await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::EndSession {
                duration,
                timestamp,
                respond_to,
            } => {
                let result = self.handle_session_ended(duration, timestamp).await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::ResetCurrentSession { respond_to } => {
                let result = self.handle_reset_current_session().await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::ResetBadge { respond_to } => {
                self.dispatcher.set_badge("").await;
                let _ = respond_to.send(());
            }
            AggregatorCommand::GetSessionTime { respond_to } => {
                let _ = respond_to.send(self.state.session_watch_seconds);
            }
            AggregatorCommand::GetToday { respond_to } => {
                let result = self.handle_get_today().await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::GetWeekly { respond_to } => {
                let result = self.handle_get_weekly().await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::Export { respond_to } => {
                let result = self.handle_export().await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::ResetRecentStats { respond_to } => {
                let result = self.handle_reset_recent_stats().await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::GetSettings { respond_to } => {
                let result = self.store.get(&keys::SETTINGS).await.settings();
                let _ = respond_to.send(result);
            }
            AggregatorCommand::UpdateSettings { update, respond_to } => {
                let result = self.handle_update_settings(update).await;
                let _ = respond_to.send(result);
            }
            AggregatorCommand::TestNotification { respond_to } => {
                self.handle_test_notification().await;
                let _ = respond_to.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: ViewEvent) -> Result<(), AggregatorError> {
        debug!(event = event.name(), url = event.url().unwrap_or(""), "Applying view event");
        match event {
            ViewEvent::ViewStarted { url } => {
                self.state.enter_item(url, self.clock.now());
                Ok(())
            }
            ViewEvent::ViewEnded { url } => {
                self.state.leave_item(&url);
                Ok(())
            }
            ViewEvent::SessionStarted => self.handle_session_started().await,
            ViewEvent::ViewConfirmed { url } => self.handle_view_confirmed(url).await,
            ViewEvent::ViewSkipped { url } => self.handle_view_skipped(url).await,
            ViewEvent::WatchTimeTick { seconds } => self.handle_watch_time_tick(seconds).await,
            ViewEvent::SessionEnded { .. } if self.state.session_started_at.is_none() => {
                // A second page closing after the first already ended the
                // shared session
                debug!("Session end with no open session, ignoring");
                Ok(())
            }
            ViewEvent::SessionEnded {
                duration,
                timestamp,
            } => {
                self.handle_session_ended(Some(duration), Some(timestamp))
                    .await
            }
        }
    }

    // ========================================================================
    // Read-Modify-Write Plumbing
    // ========================================================================

    /// Loads current state and reconciles the day boundary.
    ///
    /// On a new day (or a first run with no recorded day) the live session
    /// counters and the time window restart from zero and the badge is
    /// cleared. Historical per-day entries are left alone.
    async fn begin(&mut self, effects: &mut Effects) -> Mutation {
        let snapshot = self.store.get(&keys::mutation_keys()).await;
        let now = self.clock.now();
        let today = DayKey::from_datetime(&now);
        let mut settings = snapshot.settings();

        let rolled_over = today.is_rollover_from(settings.last_active_date.as_ref());
        if rolled_over {
            info!(
                day = %today,
                previous = ?settings.last_active_date.map(|d| d.to_string()),
                "Day rolled over, resetting session counters"
            );
            self.state.reset_counters();
            self.state.watch_time_window = 0;
            settings.last_active_date = Some(today);
            effects.badge = Some(String::new());
        }

        Mutation {
            today,
            now,
            settings,
            tables: StatsTables::from_snapshot(&snapshot),
            rolled_over,
            extra: Snapshot::new(),
        }
    }

    /// Writes the mutation back in one `set`, then releases effects.
    async fn commit(
        &mut self,
        mutation: Mutation,
        tables: TableWrite,
        effects: Effects,
    ) -> Result<(), AggregatorError> {
        let mut snapshot = match tables {
            TableWrite::Untouched => Snapshot::new(),
            TableWrite::WatchTime => mutation.tables.watch_time_snapshot(),
            TableWrite::All => mutation.tables.to_snapshot(),
        };
        if mutation.rolled_over {
            snapshot.put_settings(&mutation.settings);
        }
        snapshot.put_session_counters(&self.state);
        snapshot.merge(mutation.extra);

        let written = self.store.set(snapshot).await;
        if let Err(e) = &written {
            warn!(error = %e, "Failed to persist counters");
        }

        self.release(effects).await;
        written.map_err(AggregatorError::from)
    }

    async fn release(&self, effects: Effects) {
        if let Some(text) = effects.badge {
            self.dispatcher.set_badge(&text).await;
        }
        for intervention in effects.interventions {
            self.publish(DaemonEvent::InterventionRaised {
                intervention: intervention.clone(),
            });
            self.dispatcher.dispatch(&intervention).await;
        }
    }

    fn publish(&self, event: DaemonEvent) {
        // No subscribers is fine
        let _ = self.event_publisher.send(event);
    }

    // ========================================================================
    // Viewing Event Handlers
    // ========================================================================

    async fn handle_session_started(&mut self) -> Result<(), AggregatorError> {
        let mut effects = Effects::default();
        let mut mutation = self.begin(&mut effects).await;

        if !self.state.start_session(mutation.now) {
            debug!("Session already open, ignoring start");
            return self.commit(mutation, TableWrite::Untouched, effects).await;
        }

        let label = clock_label(&mutation.now);
        info!(day = %mutation.today, at = %label, "Session started");
        mutation.extra.put(keys::SESSION_START_TIME, label);
        self.commit(mutation, TableWrite::Untouched, effects).await
    }

    async fn handle_view_confirmed(&mut self, url: String) -> Result<(), AggregatorError> {
        let mut effects = Effects::default();
        let mut mutation = self.begin(&mut effects).await;
        let today = mutation.today;

        let mut stats = mutation.tables.stats_for(today);
        let watched = stats.record_watched(url.as_str());
        mutation.tables.put_stats(today, stats);

        let count = self.state.count_view();
        debug!(url = %url, watched, session_count = count, "View confirmed");

        effects.badge = Some(watched.to_string());

        let settings = &mutation.settings;
        if settings.redirect_enabled && count >= settings.redirect_threshold {
            info!(
                count,
                threshold = settings.redirect_threshold,
                "Session count threshold reached"
            );
            effects.interventions.push(Intervention::count(
                settings.redirect_threshold,
                Some(settings.redirect_url().to_string()),
            ));
            self.state.current_session_item_count = 0;
        }

        self.commit(mutation, TableWrite::All, effects).await
    }

    async fn handle_view_skipped(&mut self, url: String) -> Result<(), AggregatorError> {
        let mut effects = Effects::default();
        let mut mutation = self.begin(&mut effects).await;
        let today = mutation.today;

        let mut stats = mutation.tables.stats_for(today);
        let skipped = stats.record_skipped(url.as_str());
        mutation.tables.put_stats(today, stats);
        debug!(url = %url, skipped, "View skipped");

        self.commit(mutation, TableWrite::All, effects).await
    }

    async fn handle_watch_time_tick(&mut self, seconds: u64) -> Result<(), AggregatorError> {
        if seconds == 0 {
            return Ok(());
        }
        let mut effects = Effects::default();
        let mut mutation = self.begin(&mut effects).await;
        let today = mutation.today;

        let mut stats = mutation.tables.stats_for(today);
        stats.add_watch_time(seconds);
        mutation.tables.put_stats(today, stats);

        // The window counts all of today's watch time; the setting only
        // decides whether crossing it intervenes
        let window = self.state.add_watch_time(seconds);
        let settings = &mutation.settings;
        if settings.time_based_redirect_enabled && window >= TIME_THRESHOLD_SECS {
            info!(window, "Watch time threshold reached");
            let redirect = settings
                .redirect_enabled
                .then(|| settings.redirect_url().to_string());
            effects.interventions.push(Intervention::time(redirect));
            self.state.watch_time_window = 0;
        }

        self.commit(mutation, TableWrite::WatchTime, effects).await
    }

    async fn handle_session_ended(
        &mut self,
        duration: Option<u64>,
        timestamp: Option<String>,
    ) -> Result<(), AggregatorError> {
        let mut effects = Effects::default();
        let mut mutation = self.begin(&mut effects).await;

        let started = self.state.end_session();
        let duration = duration.or_else(|| {
            started.map(|at| {
                u64::try_from((mutation.now - at).num_seconds()).unwrap_or(0)
            })
        });
        let timestamp =
            timestamp.unwrap_or_else(|| clock_label(&started.unwrap_or(mutation.now)));

        let tables = match duration {
            Some(duration) => {
                info!(duration, timestamp = %timestamp, "Session ended");
                mutation
                    .tables
                    .push_session(mutation.today, SessionRecord::new(timestamp, duration));
                TableWrite::All
            }
            None => {
                debug!("Session end without an open session, nothing to record");
                TableWrite::Untouched
            }
        };

        mutation.extra.put_value(keys::SESSION_START_TIME, Value::Null);
        self.commit(mutation, tables, effects).await
    }

    async fn handle_reset_current_session(&mut self) -> Result<(), AggregatorError> {
        self.state.reset_counters();
        let mut snapshot = Snapshot::new();
        snapshot.put_session_counters(&self.state);
        self.store.set(snapshot).await?;
        debug!("Session counters reset");
        Ok(())
    }

    // ========================================================================
    // Read Models
    // ========================================================================

    async fn load_tables(&self) -> (DayKey, StatsTables) {
        let snapshot = self.store.get(&keys::DAILY_TABLES).await;
        let today = DayKey::today(self.clock.as_ref());
        (today, StatsTables::from_snapshot(&snapshot))
    }

    async fn handle_get_today(&self) -> TodaySummary {
        let (today, tables) = self.load_tables().await;
        stats::today_summary(&tables, today, &self.state)
    }

    async fn handle_get_weekly(&self) -> WeeklySeries {
        let (today, tables) = self.load_tables().await;
        stats::weekly_series(&tables, today)
    }

    async fn handle_export(&self) -> ExportDocument {
        let (_, tables) = self.load_tables().await;
        stats::export_document(&tables, self.clock.now())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    async fn handle_reset_recent_stats(&mut self) -> Result<usize, AggregatorError> {
        let (today, mut tables) = self.load_tables().await;
        let removed = tables.remove_days(&last_n_days(today, RECENT_DAYS));

        self.store.set(tables.to_snapshot()).await?;
        info!(removed, today = %today, "Recent statistics cleared");

        self.dispatcher.set_badge("").await;
        Ok(removed)
    }

    async fn handle_update_settings(
        &mut self,
        update: SettingsUpdate,
    ) -> Result<(Settings, Vec<String>), AggregatorError> {
        let mut settings = self.store.get(&keys::SETTINGS).await.settings();
        let rejected: Vec<String> = update
            .apply(&mut settings)
            .iter()
            .map(ToString::to_string)
            .collect();

        for reason in &rejected {
            warn!(reason = %reason, "Rejected settings field");
        }

        let mut snapshot = Snapshot::new();
        snapshot.put_settings(&settings);
        snapshot.put_session_counters(&self.state);
        self.store.set(snapshot).await?;

        info!(
            redirect = settings.redirect_enabled,
            threshold = settings.redirect_threshold,
            time_redirect = settings.time_based_redirect_enabled,
            "Settings updated"
        );
        Ok((settings, rejected))
    }

    async fn handle_test_notification(&self) {
        let settings = self.store.get(&keys::SETTINGS).await.settings();
        let intervention = Intervention::count(settings.redirect_threshold, None);
        self.publish(DaemonEvent::InterventionRaised {
            intervention: intervention.clone(),
        });
        self.dispatcher.dispatch(&intervention).await;
    }
}
