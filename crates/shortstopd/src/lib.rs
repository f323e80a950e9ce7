//! shortstopd - short-form viewing tracker daemon
//!
//! This crate provides the daemon functionality:
//! - `store` - persistent counter store (in-memory and JSON file backends)
//! - `aggregator` - session aggregator actor owning every counter mutation
//! - `classifier` - per-page view classifier turning page signals into events
//! - `surface` - badge, notification, popup and redirect side effects
//! - `stats` - precomputed read models for the popup and exports
//! - `server` - Unix socket server for bridge and CLI clients
//! - `client` - request/response client for the socket
//! - `config` - daemon configuration
//! - `timer` - cancellable one-shot and periodic timers
//!
//! # Panic-Free Policy
//!
//! All production code follows the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Graceful degradation on errors

pub mod aggregator;
pub mod classifier;
pub mod client;
pub mod config;
pub mod server;
pub mod stats;
pub mod store;
pub mod surface;
pub mod timer;
