//! Online/offline signal.

use std::sync::Arc;

use courier_core::events::{ClientEvent, EventBus};
use courier_core::types::Timestamp;
use tokio::sync::{broadcast, watch};

/// Shared connectivity flag.
///
/// Whatever detects the network state (OS hooks, a health check, the CLI
/// `--offline` flag) calls [`set_online`](Self::set_online); the queue and
/// coordinator read it.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
    events: EventBus,
}

impl ConnectivityMonitor {
    pub fn new(online: bool, events: EventBus) -> Self {
        let (tx, _) = watch::channel(online);
        Self {
            tx: Arc::new(tx),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current state. Returns `true` if it changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "Connectivity changed");
            self.events.publish(ClientEvent::ConnectivityChanged {
                online,
                timestamp: Timestamp::now(),
            });
        }
        changed
    }

    /// Latest-value view of the flag. Rapid changes coalesce.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Every change from now on, in order, as `ConnectivityChanged` events
    /// on the bus this monitor publishes to.
    pub fn transitions(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}
