//! In-memory storage implementation
//!
//! Used by tests and as a reference implementation of the repository traits.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use super::traits::{ConnectionStore, MessageStore, SortOrder};
use crate::models::{Connection, ConnectionId, MessageId, MessageRecord, ProcessingStatus};

type RecordKey = (String, String, String); // (user_id, mailbox, message_id)

/// In-memory implementation of both repositories
///
/// Uses HashMaps protected by RwLocks for thread-safe access.
pub struct InMemoryStore {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
    messages: RwLock<HashMap<RecordKey, MessageRecord>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            messages: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn key(record: &MessageRecord) -> RecordKey {
        (
            record.user_id.clone(),
            record.mailbox.clone(),
            record.message_id.0.clone(),
        )
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStore for InMemoryStore {
    fn insert_connection(&self, connection: Connection) -> Result<Connection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Connection { id, ..connection };
        self.connections
            .write()
            .unwrap()
            .insert(id, connection.clone());
        Ok(connection)
    }

    fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>> {
        Ok(self.connections.read().unwrap().get(&id).cloned())
    }

    fn get_connection_for_user(
        &self,
        id: ConnectionId,
        user_id: &str,
    ) -> Result<Option<Connection>> {
        Ok(self
            .connections
            .read()
            .unwrap()
            .get(&id)
            .filter(|c| c.user_id == user_id)
            .cloned())
    }

    fn list_active_connections(&self) -> Result<Vec<Connection>> {
        let mut active: Vec<Connection> = self
            .connections
            .read()
            .unwrap()
            .values()
            .filter(|c| c.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|c| c.id);
        Ok(active)
    }

    fn update_connection(&self, connection: &Connection) -> Result<()> {
        let mut connections = self.connections.write().unwrap();
        anyhow::ensure!(
            connections.contains_key(&connection.id),
            "Connection {} not found",
            connection.id
        );
        connections.insert(connection.id, connection.clone());
        Ok(())
    }
}

impl MessageStore for InMemoryStore {
    fn upsert_message(&self, record: MessageRecord) -> Result<()> {
        let key = Self::key(&record);
        let mut messages = self.messages.write().unwrap();

        // Preserve processing status on conflict, matching the SQLite upsert
        let record = match messages.get(&key) {
            Some(existing) => MessageRecord {
                processing_status: existing.processing_status,
                ..record
            },
            None => record,
        };

        messages.insert(key, record);
        Ok(())
    }

    fn existing_message_ids(
        &self,
        user_id: &str,
        mailbox: &str,
        candidates: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let messages = self.messages.read().unwrap();
        Ok(candidates
            .iter()
            .filter(|id| {
                messages.contains_key(&(
                    user_id.to_string(),
                    mailbox.to_string(),
                    id.0.clone(),
                ))
            })
            .cloned()
            .collect())
    }

    fn get_message(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
    ) -> Result<Option<MessageRecord>> {
        Ok(self
            .messages
            .read()
            .unwrap()
            .get(&(user_id.to_string(), mailbox.to_string(), id.0.clone()))
            .cloned())
    }

    fn list_messages(
        &self,
        user_id: &str,
        mailbox: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        sort: SortOrder,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<MessageRecord>> {
        let messages = self.messages.read().unwrap();
        let mut matching: Vec<MessageRecord> = messages
            .values()
            .filter(|r| {
                r.user_id == user_id
                    && r.mailbox == mailbox
                    && r.received_at >= from
                    && r.received_at < to
            })
            .cloned()
            .collect();

        matching.sort_by_key(|r| r.received_at);
        if sort == SortOrder::Desc {
            matching.reverse();
        }

        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    fn count_messages(&self, user_id: &str, mailbox: &str) -> Result<usize> {
        Ok(self
            .messages
            .read()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id && r.mailbox == mailbox)
            .count())
    }

    fn set_processing_status(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<()> {
        let mut messages = self.messages.write().unwrap();
        if let Some(record) = messages.get_mut(&(
            user_id.to_string(),
            mailbox.to_string(),
            id.0.clone(),
        )) {
            record.processing_status = status;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;

    fn make_record(id: &str, age_hours: i64) -> MessageRecord {
        let received_at = Utc::now() - chrono::Duration::hours(age_hours);
        MessageRecord::builder("user-1", "user@gmail.com", MessageId::new(id))
            .thread_id("t1")
            .from(EmailAddress::new("no-reply@chase.com"))
            .subject("Alert")
            .snippet("snippet")
            .received_at(received_at)
            .build()
    }

    #[test]
    fn test_upsert_idempotent() {
        let store = InMemoryStore::new();
        store.upsert_message(make_record("m1", 1)).unwrap();
        store.upsert_message(make_record("m1", 1)).unwrap();
        assert_eq!(store.count_messages("user-1", "user@gmail.com").unwrap(), 1);
    }

    #[test]
    fn test_upsert_preserves_status() {
        let store = InMemoryStore::new();
        store.upsert_message(make_record("m1", 1)).unwrap();
        store
            .set_processing_status(
                "user-1",
                "user@gmail.com",
                &MessageId::new("m1"),
                ProcessingStatus::Processed,
            )
            .unwrap();
        store.upsert_message(make_record("m1", 1)).unwrap();

        let loaded = store
            .get_message("user-1", "user@gmail.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.processing_status, ProcessingStatus::Processed);
    }

    #[test]
    fn test_connection_id_assignment() {
        let store = InMemoryStore::new();
        let a = store
            .insert_connection(Connection::new("u", "a@gmail.com"))
            .unwrap();
        let b = store
            .insert_connection(Connection::new("u", "b@gmail.com"))
            .unwrap();
        assert_ne!(a.id, b.id);
        assert!(store.get_connection(a.id).unwrap().is_some());
    }

    #[test]
    fn test_list_messages_sorting() {
        let store = InMemoryStore::new();
        for (id, age) in [("m1", 3), ("m2", 2), ("m3", 1)] {
            store.upsert_message(make_record(id, age)).unwrap();
        }
        let from = Utc::now() - chrono::Duration::days(1);
        let to = Utc::now();

        let asc = store
            .list_messages("user-1", "user@gmail.com", from, to, SortOrder::Asc, 10, 0)
            .unwrap();
        assert_eq!(asc[0].message_id.as_str(), "m1");

        let desc = store
            .list_messages("user-1", "user@gmail.com", from, to, SortOrder::Desc, 10, 0)
            .unwrap();
        assert_eq!(desc[0].message_id.as_str(), "m3");
    }
}
