//! Messaging seams between the transaction core and the OCPP-J transport.

mod dispatcher;
mod sender;

pub use dispatcher::{InboundHandler, MessageDispatcher};
pub use sender::{CallChannel, SendOutcome, TransactionSender};
