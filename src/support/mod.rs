//! Cross-cutting support types.

pub mod errors;

pub use errors::{CallError, OcppError, StoreError};
