//! Session lifecycle events.
//!
//! The sync service emits these best-effort over an mpsc channel so an
//! embedding application (scheduler, bot) can react to run outcomes without
//! polling the tracker. A full channel or dropped receiver is logged and
//! otherwise ignored.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncEvent {
    SessionStarted {
        session_id: Uuid,
        tenant: String,
    },
    SessionCompleted {
        session_id: Uuid,
        tenant: String,
        products_processed: usize,
        errors: usize,
    },
    SessionFailed {
        session_id: Uuid,
        tenant: String,
        errors: usize,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<SyncEvent>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<SyncEvent>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: SyncEvent) {
        if let Err(err) = self.sender.send(event).await {
            warn!("failed to deliver sync event: {}", err);
        }
    }
}

/// Convenience constructor pairing a sender with its receiver.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<SyncEvent>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}
