//! Durable-store contracts
//!
//! The charge point persists two things across reboots: connector
//! records (so an interrupted transaction is still known after a power
//! cycle) and the transaction request queue. Both sit behind narrow
//! traits so the embedding firmware can back them with whatever
//! key-value database it ships.
//!
//! The traits are synchronous on purpose: connector writers persist
//! inside a mutex critical section and must not await there. Backends
//! are expected to be local and cheap (an embedded KV store, a flash
//! filesystem), not a network round-trip.

mod memory;

pub use memory::{MemoryConnectorStore, MemoryFifoStore};

use crate::connector::ConnectorRecord;
use crate::support::StoreError;
use crate::transaction::QueuedRequest;

/// Persistence contract for the transaction request queue.
///
/// Entries are keyed by a monotonically increasing sequence number;
/// `load` must return them in ascending sequence order.
pub trait FifoStore: Send + Sync {
    fn load(&self) -> Result<Vec<(u64, QueuedRequest)>, StoreError>;
    fn insert(&self, seq: u64, request: &QueuedRequest) -> Result<(), StoreError>;
    fn remove(&self, seq: u64) -> Result<(), StoreError>;
}

/// Persistence contract for connector records.
pub trait ConnectorStore: Send + Sync {
    fn save(&self, record: &ConnectorRecord) -> Result<(), StoreError>;
    fn load_all(&self) -> Result<Vec<ConnectorRecord>, StoreError>;
}
