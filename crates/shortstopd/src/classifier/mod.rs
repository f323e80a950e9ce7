//! View classifier.
//!
//! Turns the noisy signal stream of one page (URL changes arriving from
//! several observers, visibility flips, media play/pause) into discrete
//! viewing events. One classifier task runs per connected page.
//!
//! An item becomes *watched* once it stays on screen for the dwell
//! threshold, and *skipped* if the user moves on sooner. Every timer is a
//! [`TimerHandle`] tagged with the generation of the item it belongs to;
//! a firing from a superseded item is dropped.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A closed signal channel finalizes the open session and ends the task

use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, trace};

use shortstop_core::{clock_label, is_short_form_path, Clock, ViewEvent};
use shortstop_protocol::PageSignal;

use crate::config::ClassifierConfig;
use crate::timer::TimerHandle;

mod probe;

pub use probe::{EventSink, MediaProbe, MediaStatus, ReportedMedia};

// ============================================================================
// Classifier Handle
// ============================================================================

/// Handle to a running classifier task.
#[derive(Debug)]
pub struct ClassifierHandle {
    signals: mpsc::UnboundedSender<PageSignal>,
    task: JoinHandle<()>,
}

impl ClassifierHandle {
    /// Feeds one page signal. Returns false if the task has stopped.
    pub fn signal(&self, signal: PageSignal) -> bool {
        self.signals.send(signal).is_ok()
    }

    /// Closes the signal stream and waits for the task to finalize.
    pub async fn shutdown(self) {
        drop(self.signals);
        let _ = self.task.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a classifier for one page.
pub fn spawn_classifier(
    config: ClassifierConfig,
    probe: Arc<dyn MediaProbe>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
) -> ClassifierHandle {
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let classifier = Classifier::new(config, probe, sink, clock);
    let task = tokio::spawn(classifier.run(signal_rx));
    ClassifierHandle {
        signals: signal_tx,
        task,
    }
}

// ============================================================================
// Classifier State
// ============================================================================

/// A timer firing, tagged with the item generation that armed it.
#[derive(Debug, Clone, Copy)]
enum TimerFired {
    Dwell { generation: u64 },
    Tick { generation: u64 },
    Retry { generation: u64 },
}

/// Playback state of the current item as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    Unknown,
    Playing,
    Paused,
}

/// The item on screen.
struct ItemView {
    path: String,
    entered: Instant,
    confirmed: bool,
    dwell: Option<TimerHandle>,
    discovery: Option<TimerHandle>,
}

struct OpenSession {
    started: Instant,
    wall: DateTime<Local>,
}

struct Classifier {
    dwell: Duration,
    tick: Duration,
    retry: Duration,
    probe: Arc<dyn MediaProbe>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    timer_tx: mpsc::UnboundedSender<TimerFired>,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,

    generation: u64,
    last_path: Option<String>,
    current: Option<ItemView>,
    session: Option<OpenSession>,
    playback: Playback,
    ticker: Option<TimerHandle>,
    /// Played milliseconds not yet credited as a whole second
    tick_carry_ms: u64,
    hidden: bool,
    /// Session was ended by the page going to the background
    suspended: bool,
}

impl Classifier {
    fn new(
        config: ClassifierConfig,
        probe: Arc<dyn MediaProbe>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        Self {
            dwell: config.dwell(),
            tick: config.tick(),
            retry: config.discovery_retry(),
            probe,
            sink,
            clock,
            timer_tx,
            timer_rx,
            generation: 0,
            last_path: None,
            current: None,
            session: None,
            playback: Playback::Unknown,
            ticker: None,
            tick_carry_ms: 0,
            hidden: false,
            suspended: false,
        }
    }

    async fn run(mut self, mut signals: mpsc::UnboundedReceiver<PageSignal>) {
        debug!("Classifier starting");
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(PageSignal::Unload) | None => break,
                    Some(signal) => self.handle_signal(signal).await,
                },
                Some(fired) = self.timer_rx.recv() => self.handle_timer(fired).await,
            }
        }
        self.finalize().await;
        debug!("Classifier stopped");
    }

    async fn emit(&self, event: ViewEvent) {
        trace!(event = event.name(), "Classified");
        self.sink.emit(event).await;
    }

    // ========================================================================
    // Signals
    // ========================================================================

    async fn handle_signal(&mut self, signal: PageSignal) {
        trace!(signal = signal.name(), "Page signal");
        match signal {
            PageSignal::UrlChanged { path } | PageSignal::NavigateFinish { path } => {
                self.observe_path(path).await;
            }
            PageSignal::DomMutation { .. } => {
                if let Some(path) = signal.observed_path() {
                    self.observe_path(path.to_string()).await;
                }
            }
            PageSignal::VisibilityChanged { hidden } => {
                self.hidden = hidden;
                if hidden {
                    if self.playback != Playback::Playing {
                        self.suspend().await;
                    }
                } else if self.suspended {
                    self.resume().await;
                }
            }
            PageSignal::MediaAttached { playing } => {
                let status = if playing {
                    MediaStatus::Playing
                } else {
                    MediaStatus::Paused
                };
                if let Some(item) = self.current.as_mut() {
                    item.discovery = None;
                }
                self.apply_media(status).await;
            }
            PageSignal::MediaPlay => self.apply_media(MediaStatus::Playing).await,
            PageSignal::MediaPause => self.apply_media(MediaStatus::Paused).await,
            // Handled by the run loop
            PageSignal::Unload => {}
        }
    }

    async fn observe_path(&mut self, path: String) {
        if self.last_path.as_deref() == Some(path.as_str()) {
            return;
        }
        self.last_path = Some(path.clone());
        self.suspended = false;

        if is_short_form_path(&path) {
            self.leave_current().await;
            self.ensure_session().await;
            self.enter(path).await;
        } else {
            self.leave_current().await;
            self.end_session().await;
        }
    }

    async fn apply_media(&mut self, status: MediaStatus) {
        match status {
            MediaStatus::Playing => {
                self.playback = Playback::Playing;
                self.start_ticker();
            }
            MediaStatus::Paused => {
                self.playback = Playback::Paused;
                self.ticker = None;
                if self.hidden {
                    self.suspend().await;
                }
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    async fn handle_timer(&mut self, fired: TimerFired) {
        match fired {
            TimerFired::Dwell { generation } if generation == self.generation => {
                let Some(item) = self.current.as_mut() else {
                    return;
                };
                if item.confirmed {
                    return;
                }
                item.confirmed = true;
                item.dwell = None;
                let url = item.path.clone();
                self.emit(ViewEvent::ViewConfirmed { url }).await;
            }
            TimerFired::Tick { generation } if generation == self.generation => {
                if self.playback == Playback::Playing && self.current.is_some() {
                    self.credit_tick().await;
                }
            }
            TimerFired::Retry { generation } if generation == self.generation => {
                let Some(item) = self.current.as_mut() else {
                    return;
                };
                if item.discovery.is_none() {
                    return;
                }
                if let Some(status) = self.probe.discover(&item.path) {
                    debug!(path = %item.path, ?status, "Media element found");
                    item.discovery = None;
                    self.apply_media(status).await;
                }
            }
            stale => trace!(?stale, current = self.generation, "Dropping stale timer"),
        }
    }

    /// Credits one tick period of playback, in whole seconds.
    ///
    /// Periods shorter than a second accumulate until they add up to one.
    async fn credit_tick(&mut self) {
        let period_ms = u64::try_from(self.tick.as_millis()).unwrap_or(u64::MAX);
        let played = self.tick_carry_ms.saturating_add(period_ms);
        self.tick_carry_ms = played % 1000;
        let seconds = played / 1000;
        if seconds > 0 {
            self.emit(ViewEvent::WatchTimeTick { seconds }).await;
        }
    }

    fn start_ticker(&mut self) {
        if self.ticker.is_some() || self.current.is_none() {
            return;
        }
        let tx = self.timer_tx.clone();
        let generation = self.generation;
        self.ticker = Some(TimerHandle::every(self.tick, move || {
            let _ = tx.send(TimerFired::Tick { generation });
            std::future::ready(())
        }));
    }

    // ========================================================================
    // Item and Session Transitions
    // ========================================================================

    async fn enter(&mut self, path: String) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        self.emit(ViewEvent::ViewStarted { url: path.clone() }).await;

        let tx = self.timer_tx.clone();
        let dwell = TimerHandle::once(self.dwell, move || {
            let _ = tx.send(TimerFired::Dwell { generation });
            std::future::ready(())
        });

        self.current = Some(ItemView {
            path: path.clone(),
            entered: Instant::now(),
            confirmed: false,
            dwell: Some(dwell),
            discovery: None,
        });

        match self.probe.discover(&path) {
            Some(status) => self.apply_media(status).await,
            None => {
                let tx = self.timer_tx.clone();
                let discovery = TimerHandle::every(self.retry, move || {
                    let _ = tx.send(TimerFired::Retry { generation });
                    std::future::ready(())
                });
                if let Some(item) = self.current.as_mut() {
                    item.discovery = Some(discovery);
                }
            }
        }
    }

    /// Finalizes the item on screen, if any.
    ///
    /// An item left before the dwell threshold is skipped. One left after
    /// it is confirmed now if its timer firing has not been seen yet.
    async fn leave_current(&mut self) {
        self.ticker = None;
        self.playback = Playback::Unknown;

        let Some(item) = self.current.take() else {
            return;
        };
        // Dropping the handles cancels both timers
        drop(item.dwell);
        drop(item.discovery);

        let url = item.path;
        if !item.confirmed {
            if item.entered.elapsed() >= self.dwell {
                self.emit(ViewEvent::ViewConfirmed { url: url.clone() }).await;
            } else {
                self.emit(ViewEvent::ViewSkipped { url: url.clone() }).await;
            }
        }
        self.emit(ViewEvent::ViewEnded { url }).await;
    }

    async fn ensure_session(&mut self) {
        if self.session.is_some() {
            return;
        }
        self.session = Some(OpenSession {
            started: Instant::now(),
            wall: self.clock.now(),
        });
        self.emit(ViewEvent::SessionStarted).await;
    }

    async fn end_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.tick_carry_ms = 0;
        let duration = session.started.elapsed().as_secs();
        let timestamp = clock_label(&session.wall);
        info!(duration, timestamp = %timestamp, "Viewing session ended");
        self.emit(ViewEvent::SessionEnded {
            duration,
            timestamp,
        })
        .await;
    }

    /// Ends the session because the page went to the background.
    async fn suspend(&mut self) {
        if self.session.is_none() && self.current.is_none() {
            return;
        }
        debug!("Page hidden while not playing, ending session");
        self.leave_current().await;
        self.end_session().await;
        self.suspended = true;
    }

    /// Reopens the session when a suspended page becomes visible again.
    async fn resume(&mut self) {
        self.suspended = false;
        let Some(path) = self.last_path.clone() else {
            return;
        };
        if is_short_form_path(&path) {
            debug!(path = %path, "Page visible again, resuming session");
            self.ensure_session().await;
            self.enter(path).await;
        }
    }

    async fn finalize(&mut self) {
        self.leave_current().await;
        self.end_session().await;
    }
}
