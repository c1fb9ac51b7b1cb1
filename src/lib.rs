//! # Voltgrid Charge Point
//!
//! OCPP 1.6 charge-point client core: the transaction lifecycle between
//! physical connectors and the central system.
//!
//! ## Architecture
//!
//! - **support**: Cross-cutting error types
//! - **config**: Application configuration (TOML-based)
//! - **ocpp**: Action names and `rust-ocpp` v1.6 wire types
//! - **storage**: Durable-store contracts + in-memory implementations
//! - **connector**: Connector registry with persisted transaction state
//! - **messaging**: Inbound dispatcher and outbound call channel
//! - **services**: Contracts of the collaborating subsystems
//!   (events, authorization cache, reservations, metering, smart charging)
//! - **transaction**: The transaction manager, durable request queue and
//!   retry pump
//!
//! The WebSocket transport and OCPP-J framing live in the embedding
//! application, behind [`messaging::CallChannel`] and
//! [`messaging::MessageDispatcher`].

pub mod config;
pub mod connector;
pub mod messaging;
pub mod ocpp;
pub mod services;
pub mod storage;
pub mod support;
pub mod transaction;

// Re-export commonly used types at crate root
pub use config::{ChargePointConfig, TransactionConfig};
pub use connector::{Connectors, CONNECTOR_ID_CHARGE_POINT, PROVISIONAL_TRANSACTION_ID};
pub use messaging::{CallChannel, MessageDispatcher};
pub use storage::{MemoryConnectorStore, MemoryFifoStore};
pub use transaction::{TransactionFifo, TransactionManager};
