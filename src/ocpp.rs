//! OCPP 1.6 action names and wire types.
//!
//! Wire types come from the `rust-ocpp` crate (`v1_6` module); this
//! module re-exports the subset the transaction core works with so the
//! rest of the crate has a single import path.

pub use rust_ocpp::v1_6::messages::meter_values::{MeterValuesRequest, MeterValuesResponse};
pub use rust_ocpp::v1_6::messages::remote_start_transaction::{
    RemoteStartTransactionRequest, RemoteStartTransactionResponse,
};
pub use rust_ocpp::v1_6::messages::remote_stop_transaction::{
    RemoteStopTransactionRequest, RemoteStopTransactionResponse,
};
pub use rust_ocpp::v1_6::messages::start_transaction::{
    StartTransactionRequest, StartTransactionResponse,
};
pub use rust_ocpp::v1_6::messages::stop_transaction::{
    StopTransactionRequest, StopTransactionResponse,
};
pub use rust_ocpp::v1_6::types::{
    AuthorizationStatus, ChargePointStatus, ChargingProfile, IdTagInfo, MeterValue, Reason,
    RegistrationStatus, RemoteStartStopStatus, SampledValue,
};

/// Charge point → central system actions carried by the transaction queue.
pub const START_TRANSACTION_ACTION: &str = "StartTransaction";
pub const STOP_TRANSACTION_ACTION: &str = "StopTransaction";
pub const METER_VALUES_ACTION: &str = "MeterValues";

/// Central system → charge point actions handled by the transaction core.
pub const REMOTE_START_TRANSACTION_ACTION: &str = "RemoteStartTransaction";
pub const REMOTE_STOP_TRANSACTION_ACTION: &str = "RemoteStopTransaction";
