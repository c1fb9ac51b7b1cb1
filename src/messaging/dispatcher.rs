//! Inbound message dispatcher
//!
//! Routes central-system calls to the component that registered for the
//! action name. The transport layer parses the OCPP-J envelope, then
//! hands `(action, payload)` to [`MessageDispatcher::dispatch`] and
//! wraps the result in a CallResult or CallError frame.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::support::OcppError;

/// A component able to answer one inbound OCPP action.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle the request payload and produce the response payload.
    async fn handle(&self, payload: Value) -> Result<Value, OcppError>;
}

/// Action-name → handler registry.
#[derive(Default)]
pub struct MessageDispatcher {
    handlers: DashMap<String, Arc<dyn InboundHandler>>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an action, replacing any previous one.
    pub fn register(&self, action: &str, handler: Arc<dyn InboundHandler>) {
        debug!(action, "Registering inbound handler");
        self.handlers.insert(action.to_string(), handler);
    }

    pub fn has_handler(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    /// Dispatch an inbound call to its handler.
    pub async fn dispatch(&self, action: &str, payload: Value) -> Result<Value, OcppError> {
        let handler = match self.handlers.get(action) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                warn!(action, "No handler registered for inbound action");
                return Err(OcppError::NotImplemented(format!(
                    "Action '{action}' is not supported"
                )));
            }
        };
        handler.handle(payload).await
    }
}
