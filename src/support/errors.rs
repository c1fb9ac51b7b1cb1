use thiserror::Error;

/// Failure of a single outbound OCPP call.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("Not connected to the central system")]
    NotConnected,

    #[error("Call timed out waiting for the central system")]
    Timeout,

    #[error("Call rejected by the central system: {code}: {description}")]
    Rejected { code: String, description: String },

    #[error("Payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Failure of the durable key-value store backing connectors and the
/// transaction queue.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Error surfaced by an inbound message handler, mapped onto an OCPP-J
/// error code by the transport layer.
#[derive(Debug, Error)]
pub enum OcppError {
    #[error("FormationViolation: {0}")]
    FormationViolation(String),

    #[error("NotImplemented: {0}")]
    NotImplemented(String),

    #[error("InternalError: {0}")]
    InternalError(String),
}

impl OcppError {
    /// OCPP-J error code for the CallError frame.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FormationViolation(_) => "FormationViolation",
            Self::NotImplemented(_) => "NotImplemented",
            Self::InternalError(_) => "InternalError",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::FormationViolation(msg)
            | Self::NotImplemented(msg)
            | Self::InternalError(msg) => msg,
        }
    }
}
