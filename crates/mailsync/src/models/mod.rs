//! Domain models for the sync engine

mod connection;
mod message;

pub use connection::{Connection, ConnectionId, ConnectionStatus};
pub use message::{EmailAddress, MessageId, MessageRecord, ProcessingStatus};
