//! Session aggregator using the actor pattern.
//!
//! The aggregator is the only writer of counters. It receives classified
//! viewing events (from per-page classifiers or directly from extension
//! messages), applies them to the live viewing state and the counter
//! store, and raises interventions when a threshold is crossed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  AggregatorCommand  ┌──────────────────┐  DaemonEvent  ┌─────────────┐
//! │ Classifier/Conn │────────────────────▶│ AggregatorActor  │──────────────▶│ Subscribers │
//! └─────────────────┘    (mpsc channel)   └──────────────────┘  (broadcast)  └─────────────┘
//!                                            │            │
//!                                   get/set  ▼            ▼  badge/notify/redirect
//!                                     CounterStore    HostSurface
//!                                            │
//!                                            └── StoreChange ──▶ StatsChanged
//! ```
//!
//! `StatsChanged` is derived from the store's change stream rather than
//! announced by the actor, so any write to a per-day table reaches
//! subscribers, whoever made it.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use shortstop_core::{Clock, DayKey};

use crate::store::{SharedStore, StoreChange};
use crate::surface::{HostSurface, InterventionDispatcher};

mod actor;
mod commands;
mod handle;

pub use actor::AggregatorActor;
pub use commands::{AggregatorCommand, AggregatorError, DaemonEvent};
pub use handle::AggregatorHandle;

/// Channel buffer sizes
const COMMAND_BUFFER: usize = 256;
const EVENT_BUFFER: usize = 100;

/// Creates the daemon event channel.
///
/// Made separately from the actor because the broadcast host surface
/// publishes into the same channel.
pub fn event_channel() -> broadcast::Sender<DaemonEvent> {
    let (tx, _) = broadcast::channel(EVENT_BUFFER);
    tx
}

/// Spawn the aggregator actor and return a handle for interaction.
///
/// On start the actor restores same-day counters from `store` and sets
/// the badge to today's watched count.
pub fn spawn_aggregator(
    store: SharedStore,
    surface: Arc<dyn HostSurface>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DaemonEvent>,
) -> AggregatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    // Subscribed before the actor starts so no write goes unannounced
    tokio::spawn(forward_store_changes(
        store.subscribe(),
        clock.clone(),
        events.clone(),
    ));

    let actor = AggregatorActor::new(
        cmd_rx,
        store,
        clock,
        InterventionDispatcher::new(surface),
        events.clone(),
    );
    tokio::spawn(actor.run());

    AggregatorHandle::new(cmd_tx, events)
}

/// Turns store writes to per-day tables into `StatsChanged` events.
///
/// Runs until the store's change channel closes.
async fn forward_store_changes(
    mut changes: broadcast::Receiver<StoreChange>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<DaemonEvent>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if change.touches_daily_tables() {
                    let day = DayKey::today(clock.as_ref());
                    // No subscribers is fine
                    let _ = events.send(DaemonEvent::StatsChanged { day });
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // Some writes were missed; assume the tables changed
                warn!(missed = n, "Store change stream lagged");
                let day = DayKey::today(clock.as_ref());
                let _ = events.send(DaemonEvent::StatsChanged { day });
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("Store change stream closed");
                break;
            }
        }
    }
}
