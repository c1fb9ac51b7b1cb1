//! In-memory store implementations
//!
//! Volatile backends for tests and deployments that can afford to lose
//! the queue on power loss.

use std::collections::BTreeMap;
use std::sync::Mutex;

use dashmap::DashMap;

use super::{ConnectorStore, FifoStore};
use crate::connector::ConnectorRecord;
use crate::support::StoreError;
use crate::transaction::QueuedRequest;

/// In-memory [`FifoStore`].
#[derive(Default)]
pub struct MemoryFifoStore {
    entries: Mutex<BTreeMap<u64, QueuedRequest>>,
}

impl MemoryFifoStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FifoStore for MemoryFifoStore {
    fn load(&self) -> Result<Vec<(u64, QueuedRequest)>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().map(|(seq, req)| (*seq, req.clone())).collect())
    }

    fn insert(&self, seq: u64, request: &QueuedRequest) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(seq, request.clone());
        Ok(())
    }

    fn remove(&self, seq: u64) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(&seq);
        Ok(())
    }
}

/// In-memory [`ConnectorStore`].
#[derive(Default)]
pub struct MemoryConnectorStore {
    records: DashMap<u32, ConnectorRecord>,
}

impl MemoryConnectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectorStore for MemoryConnectorStore {
    fn save(&self, record: &ConnectorRecord) -> Result<(), StoreError> {
        self.records.insert(record.id, record.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<ConnectorRecord>, StoreError> {
        let mut records: Vec<ConnectorRecord> =
            self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}
