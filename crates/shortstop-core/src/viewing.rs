//! Live viewing state.
//!
//! One [`ViewingState`] exists per daemon process and is owned by the
//! session aggregator. Page observers never touch it directly; they send
//! classified events and the aggregator applies them here.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Path prefix identifying a short-form item.
pub const SHORT_FORM_PREFIX: &str = "/shorts/";

/// Returns true if `path` points at a short-form item.
pub fn is_short_form_path(path: &str) -> bool {
    path.starts_with(SHORT_FORM_PREFIX)
}

// ============================================================================
// Session Phase
// ============================================================================

/// Whether a viewing session is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No session open.
    #[default]
    Idle,
    /// User is on the feed.
    Active,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

// ============================================================================
// Viewing State
// ============================================================================

/// Mutable state of the current viewing session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewingState {
    /// Item currently on screen (its path).
    pub current_item_id: Option<String>,
    /// When the current item appeared.
    pub item_started_at: Option<DateTime<Local>>,
    /// When the open session started; `None` while idle.
    pub session_started_at: Option<DateTime<Local>>,
    /// Confirmed views since the last session start or count intervention.
    pub current_session_item_count: u32,
    /// Seconds of playback in the open session.
    pub session_watch_seconds: u64,
    /// Seconds accumulated toward the next time intervention.
    pub watch_time_window: u64,
}

impl ViewingState {
    pub fn phase(&self) -> SessionPhase {
        if self.session_started_at.is_some() {
            SessionPhase::Active
        } else {
            SessionPhase::Idle
        }
    }

    /// Opens a session at `at`. Returns false if one was already open.
    pub fn start_session(&mut self, at: DateTime<Local>) -> bool {
        if self.session_started_at.is_some() {
            return false;
        }
        self.session_started_at = Some(at);
        self.current_session_item_count = 0;
        self.session_watch_seconds = 0;
        true
    }

    /// Closes the session and clears the live counters.
    ///
    /// Returns the start time of the session that was open, if any.
    pub fn end_session(&mut self) -> Option<DateTime<Local>> {
        let started = self.session_started_at.take();
        self.current_item_id = None;
        self.item_started_at = None;
        self.current_session_item_count = 0;
        self.session_watch_seconds = 0;
        started
    }

    /// Zeroes live counters without closing the session.
    pub fn reset_counters(&mut self) {
        self.current_session_item_count = 0;
        self.session_watch_seconds = 0;
    }

    /// Marks `item` as the one on screen.
    pub fn enter_item(&mut self, item: impl Into<String>, at: DateTime<Local>) {
        self.current_item_id = Some(item.into());
        self.item_started_at = Some(at);
    }

    /// Clears the current item if it is `item`.
    pub fn leave_item(&mut self, item: &str) {
        if self.current_item_id.as_deref() == Some(item) {
            self.current_item_id = None;
            self.item_started_at = None;
        }
    }

    /// Counts a confirmed view; returns the new session count.
    pub fn count_view(&mut self) -> u32 {
        self.current_session_item_count = self.current_session_item_count.saturating_add(1);
        self.current_session_item_count
    }

    /// Adds playback time to the session and to the intervention window.
    ///
    /// Returns the new window total.
    pub fn add_watch_time(&mut self, seconds: u64) -> u64 {
        self.session_watch_seconds = self.session_watch_seconds.saturating_add(seconds);
        self.watch_time_window = self.watch_time_window.saturating_add(seconds);
        self.watch_time_window
    }
}
