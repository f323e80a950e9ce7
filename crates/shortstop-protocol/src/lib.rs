//! shortstop protocol - wire messages for daemon communication
//!
//! This crate provides the message types exchanged between the browser
//! bridge or CLI and the daemon, plus the raw page signals the daemon's
//! view classifier consumes.

pub mod message;
pub mod signal;
pub mod version;

pub use message::{ClientMessage, DaemonMessage, MessageType};
pub use signal::PageSignal;
pub use version::{ProtocolVersion, VersionError};
