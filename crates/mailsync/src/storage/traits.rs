//! Storage trait definitions
//!
//! Typed repository interfaces per entity, abstracting over the concrete
//! backend (SQLite in production, in-memory for tests).

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::models::{Connection, ConnectionId, MessageId, MessageRecord, ProcessingStatus};

/// Sort direction for stored-message queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Repository for OAuth connections
pub trait ConnectionStore: Send + Sync {
    /// Insert a new connection, returning it with its assigned id
    fn insert_connection(&self, connection: Connection) -> Result<Connection>;

    /// Get a connection by id
    fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>>;

    /// Get a connection by id, only if owned by the given user
    fn get_connection_for_user(
        &self,
        id: ConnectionId,
        user_id: &str,
    ) -> Result<Option<Connection>>;

    /// List all active connections across users
    fn list_active_connections(&self) -> Result<Vec<Connection>>;

    /// Persist the full mutable state of a connection (update-by-id)
    fn update_connection(&self, connection: &Connection) -> Result<()>;
}

/// Repository for locally mirrored messages
pub trait MessageStore: Send + Sync {
    /// Insert-or-update keyed on (user_id, mailbox, message_id).
    ///
    /// Re-storing an already known message is a no-op write, never an error.
    /// The stored `processing_status` is preserved on conflict.
    fn upsert_message(&self, record: MessageRecord) -> Result<()>;

    /// Batched existence probe: which of `candidates` are already stored
    fn existing_message_ids(
        &self,
        user_id: &str,
        mailbox: &str,
        candidates: &[MessageId],
    ) -> Result<HashSet<MessageId>>;

    /// Get one stored record
    fn get_message(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
    ) -> Result<Option<MessageRecord>>;

    /// List stored messages in the half-open receive-time range
    /// `[from, to)`, ordered by `received_at` in the requested direction
    fn list_messages(
        &self,
        user_id: &str,
        mailbox: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        sort: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageRecord>>;

    /// Count all stored messages for a mailbox
    fn count_messages(&self, user_id: &str, mailbox: &str) -> Result<usize>;

    /// Update the downstream processing status of one message
    fn set_processing_status(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<()>;
}
