//! Collaborator contracts
//!
//! The transaction core coordinates several subsystems it does not own.
//! Each one is a narrow trait implemented by the embedding application
//! or by sibling components of the charge-point stack.

use std::sync::Arc;

use async_trait::async_trait;

use crate::ocpp::{AuthorizationStatus, ChargingProfile, IdTagInfo, MeterValue, RegistrationStatus};
use crate::transaction::TransactionFifo;

/// Callbacks into the embedding application.
#[async_trait]
pub trait ChargePointEventsHandler: Send + Sync {
    /// Current meter register for a connector, sampled at transaction
    /// start and stop (Wh).
    async fn tx_start_stop_meter_value(&self, connector_id: u32) -> i32;

    /// The central system asked to start a transaction on a connector.
    /// Returning `true` accepts the request; the application then calls
    /// [`TransactionManager::start_transaction`] once the cable is
    /// plugged and the user flow completes.
    ///
    /// [`TransactionManager::start_transaction`]: crate::transaction::TransactionManager::start_transaction
    async fn remote_start_transaction_requested(&self, connector_id: u32, id_tag: &str) -> bool;

    /// The central system asked to stop the transaction running on a
    /// connector. Returning `true` accepts; the application then calls
    /// [`TransactionManager::stop_transaction`].
    ///
    /// [`TransactionManager::stop_transaction`]: crate::transaction::TransactionManager::stop_transaction
    async fn remote_stop_transaction_requested(&self, connector_id: u32) -> bool;

    /// A deferred StartTransaction was finally delivered and the central
    /// system refused it; the application must stop dispensing energy.
    async fn transaction_de_authorized(&self, connector_id: u32);
}

/// Local authorization cache, refreshed from idTagInfo in responses.
#[async_trait]
pub trait AuthorizationCache: Send + Sync {
    async fn update(&self, id_tag: &str, info: &IdTagInfo);
}

/// Reservation policy checks and teardown.
#[async_trait]
pub trait ReservationPolicy: Send + Sync {
    /// May `id_tag` start a transaction on `connector_id` given the
    /// current reservations? `Accepted` means yes; any other status is
    /// surfaced to the caller as the authorization result.
    async fn is_transaction_allowed(&self, connector_id: u32, id_tag: &str)
        -> AuthorizationStatus;

    async fn clear_reservation(&self, connector_id: u32);
}

/// Periodic and stop-bound meter sampling.
pub trait MeterValuesService: Send + Sync {
    /// Hand the metering subsystem the shared transaction queue so its
    /// periodic samples interleave with starts and stops in enqueue
    /// order. Called once during wiring.
    fn attach_transaction_fifo(&self, fifo: Arc<TransactionFifo>);

    fn start_sampled_meter_values(&self, connector_id: u32);

    fn stop_sampled_meter_values(&self, connector_id: u32);

    /// Meter values accumulated for the StopTransaction transactionData
    /// block. Draining is the implementation's concern.
    fn tx_stop_meter_values(&self, connector_id: u32) -> Vec<MeterValue>;
}

/// Charging-profile bookkeeping for transactions.
#[async_trait]
pub trait SmartChargingService: Send + Sync {
    /// Install a TxProfile delivered alongside a RemoteStartTransaction.
    /// Returns `false` if the profile cannot be installed.
    async fn install_tx_profile(&self, connector_id: u32, profile: ChargingProfile) -> bool;

    /// Bind profiles installed before the transaction id was known.
    async fn assign_pending_tx_profiles(&self, connector_id: u32, transaction_id: i32);

    /// Drop transaction-scoped profiles when the transaction ends.
    async fn clear_tx_profiles(&self, connector_id: u32);
}

/// Registration state of the charge point with the central system.
/// Transaction traffic is gated on `Accepted`.
pub trait RegistrationStatusSource: Send + Sync {
    fn registration_status(&self) -> RegistrationStatus;
}
