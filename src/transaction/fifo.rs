//! Durable transaction request queue
//!
//! First-in-first-out queue of serialized StartTransaction /
//! StopTransaction / MeterValues requests awaiting delivery to the
//! central system. Every mutation is written through to the backing
//! [`FifoStore`], so the queue picks up where it left off after a
//! reboot. The queue is shared between the transaction manager (which
//! enqueues failed calls and drains the queue) and the meter-values
//! subsystem (which appends periodic samples during a transaction);
//! all operations are internally serialized.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::storage::FifoStore;
use crate::support::StoreError;

/// One queued outbound request: the OCPP action name and the
/// already-serialized payload, exactly as it would have gone on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub action: String,
    pub payload: Value,
}

impl QueuedRequest {
    pub fn new(action: impl Into<String>, payload: Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

struct FifoInner {
    entries: VecDeque<(u64, QueuedRequest)>,
    next_seq: u64,
}

/// Durable, thread-safe FIFO of pending outbound requests.
pub struct TransactionFifo {
    store: Arc<dyn FifoStore>,
    inner: Mutex<FifoInner>,
}

impl TransactionFifo {
    /// Open the queue, restoring entries persisted by a previous run.
    /// Sequence numbering resumes above the highest restored entry.
    pub fn open(store: Arc<dyn FifoStore>) -> Result<Self, StoreError> {
        let restored = store.load()?;
        let next_seq = restored.last().map(|(seq, _)| seq + 1).unwrap_or(0);
        if !restored.is_empty() {
            debug!(entries = restored.len(), "Restored pending transaction requests");
        }
        Ok(Self {
            store,
            inner: Mutex::new(FifoInner {
                entries: restored.into(),
                next_seq,
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.lock_inner().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append a request at the tail.
    ///
    /// A store failure is logged and the entry is kept in memory: losing
    /// durability for one message beats losing the message outright.
    pub fn push(&self, action: &str, payload: Value) {
        let request = QueuedRequest::new(action, payload);
        let mut inner = self.lock_inner();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        if let Err(e) = self.store.insert(seq, &request) {
            warn!(action, seq, error = %e, "Failed to persist queued request");
        }
        inner.entries.push_back((seq, request));
    }

    /// Peek the head without removing it.
    pub fn front(&self) -> Option<QueuedRequest> {
        self.lock_inner().entries.front().map(|(_, req)| req.clone())
    }

    /// Remove the head entry, if any.
    pub fn pop(&self) {
        let mut inner = self.lock_inner();
        if let Some((seq, _)) = inner.entries.pop_front() {
            if let Err(e) = self.store.remove(seq) {
                warn!(seq, error = %e, "Failed to remove delivered request from store");
            }
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, FifoInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
