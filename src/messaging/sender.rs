//! Outbound call channel and queue-backed sender
//!
//! [`CallChannel`] is the contract the embedding application implements
//! over its WebSocket transport: issue one OCPP call and wait for the
//! CallResult. [`TransactionSender`] layers the transaction queue on
//! top: transaction-bearing calls that fail while the link is down (or
//! flapping) are captured in the durable queue instead of being lost,
//! and the retry pump replays them later in order.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::support::CallError;
use crate::transaction::TransactionFifo;

/// Transport contract: one synchronous OCPP call round-trip.
#[async_trait]
pub trait CallChannel: Send + Sync {
    /// Whether the link to the central system is currently up.
    fn is_connected(&self) -> bool;

    /// Send a Call frame and wait for the matching CallResult payload.
    async fn call(&self, action: &str, payload: Value) -> Result<Value, CallError>;
}

/// Outcome of a queue-backed send.
#[derive(Debug)]
pub enum SendOutcome<R> {
    /// The call completed synchronously; here is the decoded response.
    Delivered(R),
    /// The call could not be delivered; the request now sits in the
    /// transaction queue and will be replayed by the retry pump.
    Deferred,
}

impl<R> SendOutcome<R> {
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred)
    }
}

/// Sender used by the transaction manager for all outbound calls.
pub struct TransactionSender {
    channel: Arc<dyn CallChannel>,
    fifo: Arc<TransactionFifo>,
}

impl TransactionSender {
    pub fn new(channel: Arc<dyn CallChannel>, fifo: Arc<TransactionFifo>) -> Self {
        Self { channel, fifo }
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// Plain typed call with no queue fallback. Used by the retry pump,
    /// which must not re-enqueue the entry it is currently replaying.
    pub async fn call<R: DeserializeOwned>(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<R, CallError> {
        let response = self.channel.call(action, payload).await?;
        Ok(serde_json::from_value(response)?)
    }

    /// Typed call with queue fallback: on any delivery failure the
    /// serialized request is appended to the transaction queue and the
    /// caller gets [`SendOutcome::Deferred`].
    ///
    /// Only fails if the request itself cannot be serialized, which for
    /// the crate's own request types cannot happen in practice.
    pub async fn call_or_queue<Q, R>(
        &self,
        action: &str,
        request: &Q,
    ) -> Result<SendOutcome<R>, serde_json::Error>
    where
        Q: Serialize,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;

        if !self.channel.is_connected() {
            debug!(action, "Link down, deferring request into the transaction queue");
            self.fifo.push(action, payload);
            return Ok(SendOutcome::Deferred);
        }

        match self.channel.call(action, payload.clone()).await {
            Ok(response) => match serde_json::from_value(response) {
                Ok(decoded) => Ok(SendOutcome::Delivered(decoded)),
                Err(e) => {
                    warn!(action, error = %e, "Undecodable response, deferring request");
                    self.fifo.push(action, payload);
                    Ok(SendOutcome::Deferred)
                }
            },
            Err(e) => {
                warn!(action, error = %e, "Call failed, deferring request into the transaction queue");
                self.fifo.push(action, payload);
                Ok(SendOutcome::Deferred)
            }
        }
    }
}
