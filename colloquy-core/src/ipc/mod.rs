//! Event types and the notification fan-out bus.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them over whatever transport they use (WebSocket, stdout JSON
//! lines, IPC bridges).

pub mod events;

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast;

use events::{Notification, NotificationPayload};

/// Broadcast capacity: 256 notifications buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Fan-out bus for pipeline notifications.
///
/// Cheap to clone; every clone shares the same channel and sequence counter,
/// so `seq` is monotonically increasing across all emitters.
#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<Notification>,
    seq: Arc<AtomicU64>,
}

impl NotificationBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAP);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit one notification. Send failures mean "no subscribers" and are
    /// deliberately ignored — the pipeline never depends on being observed.
    pub fn emit(&self, payload: NotificationPayload) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Notification { seq, payload });
    }

    /// Subscribe to live notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}
