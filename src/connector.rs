//! Connector registry
//!
//! The charge point exposes one record per physical connector plus a
//! synthetic record with id 0 representing the station as a whole (used
//! by station-wide reservations; it never hosts a transaction). The
//! registry owns the records and is the only component that persists
//! them: callers mutate a connector's state under its mutex and hand
//! the same guard to [`Connectors::persist`] so the stored record can
//! never diverge from the in-memory one inside a critical section.
//!
//! `transaction_id` encoding: `0` means no transaction, `-1` means a
//! StartTransaction has been deferred into the transaction queue and
//! the real id is not yet known, any other value is the id assigned by
//! the central system.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ocpp::ChargePointStatus;
use crate::storage::ConnectorStore;

/// Id of the synthetic connector representing the whole charge point.
pub const CONNECTOR_ID_CHARGE_POINT: u32 = 0;

/// Transaction id placeholder while the StartTransaction sits in the queue.
pub const PROVISIONAL_TRANSACTION_ID: i32 = -1;

/// Persisted snapshot of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorRecord {
    pub id: u32,
    pub status: ChargePointStatus,
    pub transaction_id: i32,
    pub transaction_start: Option<DateTime<Utc>>,
    pub transaction_id_tag: String,
    pub reservation_id: Option<i32>,
}

impl ConnectorRecord {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            status: ChargePointStatus::Available,
            transaction_id: 0,
            transaction_start: None,
            transaction_id_tag: String::new(),
            reservation_id: None,
        }
    }
}

/// Mutable connector fields, guarded by the connector's mutex.
#[derive(Debug)]
pub struct ConnectorState {
    pub status: ChargePointStatus,
    pub transaction_id: i32,
    pub transaction_start: Option<DateTime<Utc>>,
    pub transaction_id_tag: String,
    pub reservation_id: Option<i32>,
}

impl ConnectorState {
    fn from_record(record: &ConnectorRecord) -> Self {
        Self {
            status: record.status.clone(),
            transaction_id: record.transaction_id,
            transaction_start: record.transaction_start,
            transaction_id_tag: record.transaction_id_tag.clone(),
            reservation_id: record.reservation_id,
        }
    }

    /// True while a transaction (confirmed or provisional) is bound here.
    pub fn has_transaction(&self) -> bool {
        self.transaction_id != 0
    }
}

/// A single connector: immutable id plus mutex-guarded state.
#[derive(Debug)]
pub struct Connector {
    pub id: u32,
    state: Mutex<ConnectorState>,
}

impl Connector {
    fn new(record: &ConnectorRecord) -> Self {
        Self {
            id: record.id,
            state: Mutex::new(ConnectorState::from_record(record)),
        }
    }

    /// Lock the connector state. Short critical sections only.
    pub fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Out-of-lock snapshot for readers outside the transaction core.
    pub fn snapshot(&self) -> ConnectorRecord {
        let state = self.lock();
        ConnectorRecord {
            id: self.id,
            status: state.status.clone(),
            transaction_id: state.transaction_id,
            transaction_start: state.transaction_start,
            transaction_id_tag: state.transaction_id_tag.clone(),
            reservation_id: state.reservation_id,
        }
    }
}

/// Registry of all connectors, including the charge-point connector 0.
pub struct Connectors {
    connectors: Vec<Arc<Connector>>,
    store: Arc<dyn ConnectorStore>,
}

impl Connectors {
    /// Build the registry for `connector_count` physical connectors,
    /// restoring any state the store still holds from a previous run.
    pub fn new(connector_count: u32, store: Arc<dyn ConnectorStore>) -> Self {
        let restored = match store.load_all() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to restore connectors, starting clean");
                Vec::new()
            }
        };

        let connectors = (0..=connector_count)
            .map(|id| {
                let record = restored
                    .iter()
                    .find(|r| r.id == id)
                    .cloned()
                    .unwrap_or_else(|| ConnectorRecord::new(id));
                Arc::new(Connector::new(&record))
            })
            .collect();

        Self { connectors, store }
    }

    /// Number of physical connectors (excluding connector 0).
    pub fn connector_count(&self) -> u32 {
        (self.connectors.len() - 1) as u32
    }

    /// Look up any connector by id, including the charge-point connector.
    pub fn get(&self, id: u32) -> Option<Arc<Connector>> {
        self.connectors.get(id as usize).cloned()
    }

    /// The synthetic connector representing the whole charge point.
    pub fn charge_point(&self) -> Arc<Connector> {
        Arc::clone(&self.connectors[CONNECTOR_ID_CHARGE_POINT as usize])
    }

    /// Physical connectors only (ids >= 1).
    pub fn physical(&self) -> impl Iterator<Item = &Arc<Connector>> {
        self.connectors.iter().skip(1)
    }

    /// Persist a connector's state. Called while the caller still holds
    /// the connector's lock so the stored record matches what was written.
    pub fn persist(&self, id: u32, state: &ConnectorState) {
        let record = ConnectorRecord {
            id,
            status: state.status.clone(),
            transaction_id: state.transaction_id,
            transaction_start: state.transaction_start,
            transaction_id_tag: state.transaction_id_tag.clone(),
            reservation_id: state.reservation_id,
        };
        if let Err(e) = self.store.save(&record) {
            warn!(connector_id = id, error = %e, "Failed to persist connector");
        }
    }
}
