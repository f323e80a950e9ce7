//! shortstop core - shared domain types for short-form viewing tracking
//!
//! This crate provides the domain types shared between the daemon
//! (shortstopd), the wire protocol and the CLI:
//! - `day` - calendar-day partition keys and the clock abstraction
//! - `stats` - per-day aggregates and session records
//! - `settings` - redirect thresholds and their validation
//! - `viewing` - the live viewing state owned by the session aggregator
//! - `event` - classified viewing events
//! - `intervention` - threshold-crossing intents
//! - `report` - precomputed views for presentation surfaces
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod day;
pub mod error;
pub mod event;
pub mod intervention;
pub mod report;
pub mod settings;
pub mod stats;
pub mod viewing;

// Re-exports for convenience
pub use day::{clock_label, last_n_days, Clock, DayKey, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use event::ViewEvent;
pub use intervention::{Intervention, InterventionKind, TIME_THRESHOLD_SECS};
pub use report::{ExportDay, ExportDocument, ExportMetadata, TodaySummary, WeeklySeries};
pub use settings::{
    Settings, SettingsUpdate, DEFAULT_REDIRECT_THRESHOLD, DEFAULT_REDIRECT_URL,
    MAX_REDIRECT_THRESHOLD, MIN_REDIRECT_THRESHOLD,
};
pub use stats::{DailyStats, SessionRecord};
pub use viewing::{is_short_form_path, SessionPhase, ViewingState, SHORT_FORM_PREFIX};
