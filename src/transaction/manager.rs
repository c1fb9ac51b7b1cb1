//! Transaction manager
//!
//! Coordinates the lifecycle of charging transactions: local start and
//! stop, RemoteStartTransaction / RemoteStopTransaction handling, and
//! the retry pump that drains the durable transaction queue once the
//! link to the central system is back and the charge point is
//! registered.
//!
//! Delivery policy: a queued request is attempted once plus
//! `message_attempts` retries with a flat `message_retry_interval`
//! backoff, then dropped so the queue cannot wedge. Retries never skip
//! the queue head, so a StopTransaction can never overtake the
//! StartTransaction it belongs to.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::TransactionConfig;
use crate::connector::{Connectors, CONNECTOR_ID_CHARGE_POINT, PROVISIONAL_TRANSACTION_ID};
use crate::messaging::{
    CallChannel, InboundHandler, MessageDispatcher, SendOutcome, TransactionSender,
};
use crate::ocpp::{
    AuthorizationStatus, ChargePointStatus, IdTagInfo, MeterValuesResponse, Reason,
    RegistrationStatus, RemoteStartStopStatus, RemoteStartTransactionRequest,
    RemoteStartTransactionResponse, RemoteStopTransactionRequest, RemoteStopTransactionResponse,
    StartTransactionRequest, StartTransactionResponse, StopTransactionRequest,
    StopTransactionResponse, METER_VALUES_ACTION, REMOTE_START_TRANSACTION_ACTION,
    REMOTE_STOP_TRANSACTION_ACTION, START_TRANSACTION_ACTION, STOP_TRANSACTION_ACTION,
};
use crate::services::{
    AuthorizationCache, ChargePointEventsHandler, MeterValuesService, RegistrationStatusSource,
    ReservationPolicy, SmartChargingService,
};
use crate::support::OcppError;
use crate::transaction::{QueuedRequest, RetryTimer, TransactionFifo};

/// Reprobe interval while connected but not yet accepted by the
/// central system.
const REGISTRATION_REPROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Charging-transaction coordinator.
pub struct TransactionManager {
    config: TransactionConfig,
    events: Arc<dyn ChargePointEventsHandler>,
    connectors: Arc<Connectors>,
    sender: TransactionSender,
    registration: Arc<dyn RegistrationStatusSource>,
    authorization: Arc<dyn AuthorizationCache>,
    reservations: Arc<dyn ReservationPolicy>,
    metering: Arc<dyn MeterValuesService>,
    smart_charging: Arc<dyn SmartChargingService>,
    fifo: Arc<TransactionFifo>,
    retry_timer: RetryTimer,
    retry_count: AtomicU32,
    pump_gate: tokio::sync::Mutex<()>,
    me: Weak<Self>,
}

impl TransactionManager {
    /// Wire the manager into the charge-point stack: registers the
    /// remote start/stop handlers on the dispatcher and hands the
    /// shared transaction queue to the metering subsystem.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TransactionConfig,
        events: Arc<dyn ChargePointEventsHandler>,
        connectors: Arc<Connectors>,
        dispatcher: &MessageDispatcher,
        channel: Arc<dyn CallChannel>,
        registration: Arc<dyn RegistrationStatusSource>,
        authorization: Arc<dyn AuthorizationCache>,
        reservations: Arc<dyn ReservationPolicy>,
        metering: Arc<dyn MeterValuesService>,
        smart_charging: Arc<dyn SmartChargingService>,
        fifo: Arc<TransactionFifo>,
    ) -> Arc<Self> {
        let manager = Arc::new_cyclic(|me| Self {
            config,
            events,
            connectors,
            sender: TransactionSender::new(channel, Arc::clone(&fifo)),
            registration,
            authorization,
            reservations,
            metering: Arc::clone(&metering),
            smart_charging,
            fifo,
            retry_timer: RetryTimer::new(),
            retry_count: AtomicU32::new(0),
            pump_gate: tokio::sync::Mutex::new(()),
            me: me.clone(),
        });

        dispatcher.register(
            REMOTE_START_TRANSACTION_ACTION,
            Arc::new(RemoteStartTransactionHandler {
                manager: Arc::downgrade(&manager),
            }),
        );
        dispatcher.register(
            REMOTE_STOP_TRANSACTION_ACTION,
            Arc::new(RemoteStopTransactionHandler {
                manager: Arc::downgrade(&manager),
            }),
        );
        metering.attach_transaction_fifo(Arc::clone(&manager.fifo));

        manager
    }

    /// Connectivity reactor: on reconnection, resume draining the
    /// transaction queue. Disconnection needs no action: queued
    /// requests stay put and an in-flight pump observes the link state
    /// at its loop boundary.
    pub fn update_connection_status(&self, is_connected: bool) {
        if is_connected && self.fifo.size() != 0 {
            info!("Restarting transaction queue processing");
            self.schedule_pump();
        }
    }

    // ── Local start ────────────────────────────────────────────

    /// Start a transaction on a connector.
    ///
    /// Returns the authorization decision. `Accepted` with a deferred
    /// StartTransaction leaves the connector holding the provisional
    /// transaction id until the session ends.
    pub async fn start_transaction(
        &self,
        connector_id: u32,
        id_tag: &str,
    ) -> AuthorizationStatus {
        // Not allowed to start a transaction on the charge-point connector
        if connector_id == CONNECTOR_ID_CHARGE_POINT {
            return AuthorizationStatus::Invalid;
        }
        let Some(connector) = self.connectors.get(connector_id) else {
            return AuthorizationStatus::Invalid;
        };

        // Check if no pending reservation blocks this connector
        let allowed = self
            .reservations
            .is_transaction_allowed(connector_id, id_tag)
            .await;
        if allowed != AuthorizationStatus::Accepted {
            return allowed;
        }

        // Prepare message; the meter is sampled before sending so the
        // queued payload matches what gets persisted on deferral
        let mut request = StartTransactionRequest {
            connector_id,
            id_tag: id_tag.to_string(),
            meter_start: self.events.tx_start_stop_meter_value(connector_id).await,
            reservation_id: None,
            timestamp: Utc::now(),
        };

        // Reservation binding: the connector's own reservation wins
        // over a station-wide one
        let (status, reservation_id) = {
            let state = connector.lock();
            (state.status.clone(), state.reservation_id)
        };
        if status == ChargePointStatus::Reserved {
            request.reservation_id = reservation_id;
            self.reservations.clear_reservation(connector_id).await;
        } else if self.config.reserve_connector_zero {
            let charge_point = self.connectors.charge_point();
            let (cp_status, cp_reservation_id) = {
                let state = charge_point.lock();
                (state.status.clone(), state.reservation_id)
            };
            if cp_status == ChargePointStatus::Reserved
                && self
                    .reservations
                    .is_transaction_allowed(CONNECTOR_ID_CHARGE_POINT, id_tag)
                    .await
                    == AuthorizationStatus::Accepted
            {
                request.reservation_id = cp_reservation_id;
                self.reservations.clear_reservation(connector_id).await;
            }
        }

        info!(connector_id, id_tag, "Start transaction requested");

        let outcome = match self
            .sender
            .call_or_queue::<_, StartTransactionResponse>(START_TRANSACTION_ACTION, &request)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(connector_id, error = %e, "Cannot serialize StartTransaction");
                return AuthorizationStatus::Invalid;
            }
        };

        let (ret, response) = match outcome {
            SendOutcome::Delivered(response) => {
                let status = response.id_tag_info.status.clone();
                // Update id tag information
                if status != AuthorizationStatus::ConcurrentTx {
                    self.authorization.update(id_tag, &response.id_tag_info).await;
                }
                (status, response)
            }
            SendOutcome::Deferred => {
                // Send the message later, authorize the transaction meanwhile
                self.arm_retry_timer(Duration::from_secs(self.config.message_retry_interval));
                (
                    AuthorizationStatus::Accepted,
                    StartTransactionResponse {
                        transaction_id: PROVISIONAL_TRANSACTION_ID,
                        id_tag_info: IdTagInfo {
                            status: AuthorizationStatus::Accepted,
                            expiry_date: None,
                            parent_id_tag: None,
                        },
                    },
                )
            }
        };

        if ret == AuthorizationStatus::Accepted {
            info!(
                connector_id,
                transaction_id = response.transaction_id,
                "Start transaction accepted"
            );

            {
                let mut state = connector.lock();
                state.transaction_id = response.transaction_id;
                state.transaction_start = Some(Utc::now());
                state.transaction_id_tag = id_tag.to_string();
                self.connectors.persist(connector_id, &state);
            }

            // Assign pending charging profiles to the transaction
            self.smart_charging
                .assign_pending_tx_profiles(connector_id, response.transaction_id)
                .await;

            // Start sampled meter values on this connector
            self.metering.start_sampled_meter_values(connector_id);
        } else {
            warn!(
                connector_id,
                authorization_status = ?ret,
                "Start transaction refused"
            );

            // Close the transaction id at the central system: some
            // implementations require it, and the id is unique so it
            // cannot clash elsewhere
            let stop_request = StopTransactionRequest {
                id_tag: None,
                meter_stop: request.meter_start,
                timestamp: request.timestamp,
                transaction_id: response.transaction_id,
                reason: Some(Reason::DeAuthorized),
                transaction_data: None,
            };
            match self
                .sender
                .call_or_queue::<_, StopTransactionResponse>(STOP_TRANSACTION_ACTION, &stop_request)
                .await
            {
                Ok(SendOutcome::Deferred) => {
                    self.arm_retry_timer(Duration::from_secs(self.config.message_retry_interval));
                }
                Ok(SendOutcome::Delivered(_)) => {}
                Err(e) => {
                    error!(connector_id, error = %e, "Cannot serialize compensating StopTransaction");
                }
            }
        }

        ret
    }

    // ── Local stop ─────────────────────────────────────────────

    /// Stop the transaction running on a connector.
    ///
    /// Returns `true` if a transaction was in progress. The connector
    /// state is cleared and persisted before the StopTransaction send,
    /// so a crash mid-send cannot leave stale transaction state; the
    /// queue guarantees the message still reaches the central system.
    pub async fn stop_transaction(
        &self,
        connector_id: u32,
        id_tag: Option<&str>,
        reason: Reason,
    ) -> bool {
        let Some(connector) = self.connectors.get(connector_id) else {
            return false;
        };

        // Check if a transaction is in progress
        let transaction_id = connector.lock().transaction_id;
        if transaction_id == 0 {
            return false;
        }

        // Stop sampled meter values on this connector
        self.metering.stop_sampled_meter_values(connector_id);

        let id_tag = id_tag.filter(|tag| !tag.is_empty());
        let transaction_data = self.metering.tx_stop_meter_values(connector_id);
        let request = StopTransactionRequest {
            id_tag: id_tag.map(str::to_string),
            meter_stop: self.events.tx_start_stop_meter_value(connector_id).await,
            timestamp: Utc::now(),
            transaction_id,
            reason: Some(reason.clone()),
            transaction_data: if transaction_data.is_empty() {
                None
            } else {
                Some(transaction_data)
            },
        };

        // Reset the transaction id
        {
            let mut state = connector.lock();
            state.transaction_id = 0;
            state.transaction_id_tag.clear();
            state.transaction_start = None;
            self.connectors.persist(connector_id, &state);
        }

        info!(transaction_id, id_tag = ?id_tag, reason = ?reason, "Stop transaction");

        match self
            .sender
            .call_or_queue::<_, StopTransactionResponse>(STOP_TRANSACTION_ACTION, &request)
            .await
        {
            Ok(SendOutcome::Delivered(response)) => {
                // Update id tag information
                if let (Some(tag), Some(info)) = (id_tag, response.id_tag_info.as_ref()) {
                    self.authorization.update(tag, info).await;
                }
            }
            Ok(SendOutcome::Deferred) => {
                self.arm_retry_timer(Duration::from_secs(self.config.message_retry_interval));
            }
            Err(e) => {
                error!(connector_id, error = %e, "Cannot serialize StopTransaction");
            }
        }

        // Remove charging profiles for this transaction
        self.smart_charging.clear_tx_profiles(connector_id).await;

        true
    }

    // ── Remote commands ────────────────────────────────────────

    /// RemoteStartTransaction: policy check only. Accepting does not
    /// start the transaction; the embedding application does that after
    /// its `remote_start_transaction_requested` callback.
    async fn handle_remote_start(
        &self,
        request: RemoteStartTransactionRequest,
    ) -> RemoteStartTransactionResponse {
        info!(
            connector_id = ?request.connector_id,
            id_tag = request.id_tag.as_str(),
            "Remote start transaction requested"
        );

        // No remote start allowed without a connector id
        let mut authorized = false;
        if let Some(connector_id) = request.connector_id {
            if connector_id != CONNECTOR_ID_CHARGE_POINT {
                if let Some(connector) = self.connectors.get(connector_id) {
                    // A transaction must be possible on this connector
                    let (status, transaction_id) = {
                        let state = connector.lock();
                        (state.status.clone(), state.transaction_id)
                    };
                    if status != ChargePointStatus::Unavailable
                        && transaction_id == 0
                        && self
                            .reservations
                            .is_transaction_allowed(connector_id, &request.id_tag)
                            .await
                            == AuthorizationStatus::Accepted
                    {
                        authorized = self
                            .events
                            .remote_start_transaction_requested(connector_id, &request.id_tag)
                            .await;
                        if authorized {
                            if let Some(profile) = request.charging_profile.clone() {
                                authorized = self
                                    .smart_charging
                                    .install_tx_profile(connector_id, profile)
                                    .await;
                            }
                        }
                    }
                }
            }
        }

        let status = if authorized {
            RemoteStartStopStatus::Accepted
        } else {
            RemoteStartStopStatus::Rejected
        };
        info!(connector_id = ?request.connector_id, status = ?status, "Remote start transaction");
        RemoteStartTransactionResponse { status }
    }

    /// RemoteStopTransaction: find the connector carrying the requested
    /// transaction and ask the application; stopping is then the
    /// application's move.
    async fn handle_remote_stop(
        &self,
        request: RemoteStopTransactionRequest,
    ) -> RemoteStopTransactionResponse {
        info!(
            transaction_id = request.transaction_id,
            "Remote stop transaction requested"
        );

        let mut authorized = false;
        for connector in self.connectors.physical() {
            let transaction_id = connector.lock().transaction_id;
            if transaction_id != 0 && transaction_id == request.transaction_id {
                authorized = self.events.remote_stop_transaction_requested(connector.id).await;
                break;
            }
        }

        let status = if authorized {
            RemoteStartStopStatus::Accepted
        } else {
            RemoteStartStopStatus::Rejected
        };
        info!(
            transaction_id = request.transaction_id,
            status = ?status,
            "Remote stop transaction"
        );
        RemoteStopTransactionResponse { status }
    }

    // ── Retry pump ─────────────────────────────────────────────

    /// Schedule one pump run. Runs are serialized through a gate, so at
    /// most one logical execution is active at a time; a run scheduled
    /// while another is active simply executes after it (and usually
    /// finds the queue empty or a retry already armed).
    fn schedule_pump(&self) {
        if let Some(manager) = self.me.upgrade() {
            tokio::spawn(async move {
                let _gate = manager.pump_gate.lock().await;
                manager.process_fifo_requests().await;
            });
        }
    }

    fn arm_retry_timer(&self, delay: Duration) {
        let me = self.me.clone();
        self.retry_timer.restart(delay, move || {
            if let Some(manager) = me.upgrade() {
                manager.schedule_pump();
            }
        });
    }

    /// Drain the transaction queue head by head.
    ///
    /// Exits when the queue is empty, a retry has been scheduled, the
    /// link dropped, or the charge point is not registered yet (250 ms
    /// reprobe in that case).
    async fn process_fifo_requests(&self) {
        if !self.sender.is_connected() {
            return;
        }
        if self.registration.registration_status() != RegistrationStatus::Accepted {
            // Wait to be accepted by the central system
            self.arm_retry_timer(REGISTRATION_REPROBE_INTERVAL);
            return;
        }

        while let Some(request) = self.fifo.front() {
            debug!(
                action = request.action.as_str(),
                retries = self.retry_count.load(Ordering::SeqCst),
                max_retries = self.config.message_attempts,
                "Processing queued request"
            );

            if self.replay(&request).await {
                debug!(action = request.action.as_str(), "Queued request delivered");
                self.fifo.pop();
                self.retry_count.store(0, Ordering::SeqCst);
            } else {
                let retries = self.retry_count.fetch_add(1, Ordering::SeqCst) + 1;
                if retries > self.config.message_attempts {
                    // Drop the head so the queue cannot wedge
                    warn!(
                        action = request.action.as_str(),
                        retries, "Retry budget exhausted, dropping queued request"
                    );
                    self.fifo.pop();
                    self.retry_count.store(0, Ordering::SeqCst);
                } else if self.sender.is_connected() {
                    debug!(
                        interval_s = self.config.message_retry_interval,
                        "Delivery failed, retry scheduled"
                    );
                    self.arm_retry_timer(Duration::from_secs(self.config.message_retry_interval));
                }
            }

            if self.retry_timer.is_armed() || !self.sender.is_connected() {
                break;
            }
        }
    }

    /// Replay one queued request. Returns `true` on delivery.
    async fn replay(&self, request: &QueuedRequest) -> bool {
        match request.action.as_str() {
            START_TRANSACTION_ACTION => {
                // The response carries the authorization verdict for a
                // transaction that is already running locally
                match self
                    .sender
                    .call::<StartTransactionResponse>(&request.action, request.payload.clone())
                    .await
                {
                    Ok(response) => {
                        self.finish_deferred_start(&request.payload, &response).await;
                        true
                    }
                    Err(e) => {
                        debug!(error = %e, "StartTransaction replay failed");
                        false
                    }
                }
            }
            STOP_TRANSACTION_ACTION => self
                .sender
                .call::<StopTransactionResponse>(&request.action, request.payload.clone())
                .await
                .is_ok(),
            METER_VALUES_ACTION => self
                .sender
                .call::<MeterValuesResponse>(&request.action, request.payload.clone())
                .await
                .is_ok(),
            other => {
                warn!(action = other, "Unknown action at queue head");
                false
            }
        }
    }

    /// A deferred StartTransaction finally made it to the central
    /// system: refresh the authorization cache and, if the verdict is a
    /// refusal, tell the application to stop dispensing energy, unless
    /// the connector has meanwhile been taken over by another id tag.
    async fn finish_deferred_start(&self, payload: &Value, response: &StartTransactionResponse) {
        let request: StartTransactionRequest = match serde_json::from_value(payload.clone()) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "Queued StartTransaction payload is unreadable");
                return;
            }
        };

        if response.id_tag_info.status != AuthorizationStatus::ConcurrentTx {
            self.authorization
                .update(&request.id_tag, &response.id_tag_info)
                .await;
        }

        if response.id_tag_info.status != AuthorizationStatus::Accepted {
            if let Some(connector) = self.connectors.get(request.connector_id) {
                let de_authorized = {
                    let state = connector.lock();
                    state.transaction_id == PROVISIONAL_TRANSACTION_ID
                        && state.transaction_id_tag == request.id_tag
                };
                if de_authorized {
                    warn!(
                        connector_id = request.connector_id,
                        "Deferred transaction refused by the central system"
                    );
                    self.events.transaction_de_authorized(request.connector_id).await;
                }
            }
        }
    }
}

// ── Inbound handler registrations ──────────────────────────────

struct RemoteStartTransactionHandler {
    manager: Weak<TransactionManager>,
}

#[async_trait]
impl InboundHandler for RemoteStartTransactionHandler {
    async fn handle(&self, payload: Value) -> Result<Value, OcppError> {
        let Some(manager) = self.manager.upgrade() else {
            return Err(OcppError::InternalError("Transaction manager is gone".into()));
        };
        let request: RemoteStartTransactionRequest = serde_json::from_value(payload)
            .map_err(|e| OcppError::FormationViolation(e.to_string()))?;
        let response = manager.handle_remote_start(request).await;
        serde_json::to_value(&response).map_err(|e| OcppError::InternalError(e.to_string()))
    }
}

struct RemoteStopTransactionHandler {
    manager: Weak<TransactionManager>,
}

#[async_trait]
impl InboundHandler for RemoteStopTransactionHandler {
    async fn handle(&self, payload: Value) -> Result<Value, OcppError> {
        let Some(manager) = self.manager.upgrade() else {
            return Err(OcppError::InternalError("Transaction manager is gone".into()));
        };
        let request: RemoteStopTransactionRequest = serde_json::from_value(payload)
            .map_err(|e| OcppError::FormationViolation(e.to_string()))?;
        let response = manager.handle_remote_stop(request).await;
        serde_json::to_value(&response).map_err(|e| OcppError::InternalError(e.to_string()))
    }
}
