//! SQLite-backed storage for connections and message records

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection as DbConn, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{ConnectionStore, MessageStore, SortOrder};
use crate::models::{
    Connection, ConnectionId, ConnectionStatus, EmailAddress, MessageId, MessageRecord,
    ProcessingStatus,
};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One OAuth credential per (user, mailbox)
            CREATE TABLE connections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                mailbox TEXT NOT NULL,
                access_token TEXT,
                refresh_token TEXT,
                token_expires_at TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                last_sync_at TEXT,
                last_error TEXT,
                created_at TEXT NOT NULL,
                UNIQUE (user_id, mailbox)
            );

            CREATE INDEX idx_connections_status ON connections(status);

            -- Locally mirrored messages; the primary key is the sole
            -- idempotency mechanism against duplicate inserts
            CREATE TABLE messages (
                user_id TEXT NOT NULL,
                mailbox TEXT NOT NULL,
                message_id TEXT NOT NULL,
                thread_id TEXT NOT NULL,
                from_name TEXT,
                from_email TEXT NOT NULL,
                to_recipients TEXT NOT NULL DEFAULT '[]',  -- JSON array
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                body_text TEXT,
                internal_date INTEGER NOT NULL,
                received_at TEXT NOT NULL,
                processing_status TEXT NOT NULL DEFAULT 'pending',
                PRIMARY KEY (user_id, mailbox, message_id)
            );

            CREATE INDEX idx_messages_received_at
                ON messages(user_id, mailbox, received_at);
            "#,
        ),
    ])
}

/// SQLite-backed store implementing both repositories
pub struct SqliteStore {
    conn: Mutex<DbConn>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = DbConn::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL for concurrent readers during writes; NORMAL sync is safe
        // under WAL and avoids an fsync per transaction.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, for tests
    pub fn in_memory() -> Result<Self> {
        let mut conn = DbConn::open_in_memory()?;
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_connection(row: &rusqlite::Row<'_>) -> rusqlite::Result<Connection> {
        let token_expires_at: Option<String> = row.get(5)?;
        let status: String = row.get(6)?;
        let last_sync_at: Option<String> = row.get(7)?;
        let created_at: String = row.get(9)?;

        Ok(Connection {
            id: row.get(0)?,
            user_id: row.get(1)?,
            mailbox: row.get(2)?,
            access_token: row.get(3)?,
            refresh_token: row.get(4)?,
            token_expires_at: token_expires_at.as_deref().and_then(parse_rfc3339),
            status: ConnectionStatus::parse(&status),
            last_sync_at: last_sync_at.as_deref().and_then(parse_rfc3339),
            last_error: row.get(8)?,
            created_at: parse_rfc3339(&created_at).unwrap_or_else(Utc::now),
        })
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRecord> {
        let to_json: String = row.get(6)?;
        let received_at: String = row.get(11)?;
        let status: String = row.get(12)?;

        Ok(MessageRecord {
            user_id: row.get(0)?,
            mailbox: row.get(1)?,
            message_id: MessageId::new(row.get::<_, String>(2)?),
            thread_id: row.get(3)?,
            from: EmailAddress {
                name: row.get(4)?,
                email: row.get(5)?,
            },
            to: serde_json::from_str(&to_json).unwrap_or_default(),
            subject: row.get(7)?,
            snippet: row.get(8)?,
            body_text: row.get(9)?,
            internal_date: row.get(10)?,
            received_at: parse_rfc3339(&received_at).unwrap_or_else(Utc::now),
            processing_status: ProcessingStatus::parse(&status),
        })
    }
}

const CONNECTION_COLUMNS: &str = "id, user_id, mailbox, access_token, refresh_token, \
     token_expires_at, status, last_sync_at, last_error, created_at";

const MESSAGE_COLUMNS: &str = "user_id, mailbox, message_id, thread_id, from_name, from_email, \
     to_recipients, subject, snippet, body_text, internal_date, received_at, processing_status";

fn parse_rfc3339(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

impl ConnectionStore for SqliteStore {
    fn insert_connection(&self, connection: Connection) -> Result<Connection> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO connections
             (user_id, mailbox, access_token, refresh_token, token_expires_at,
              status, last_sync_at, last_error, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                connection.user_id,
                connection.mailbox,
                connection.access_token,
                connection.refresh_token,
                connection.token_expires_at.map(|t| t.to_rfc3339()),
                connection.status.as_str(),
                connection.last_sync_at.map(|t| t.to_rfc3339()),
                connection.last_error,
                connection.created_at.to_rfc3339(),
            ],
        )
        .context("Failed to insert connection")?;

        let id = conn.last_insert_rowid();
        Ok(Connection { id, ..connection })
    }

    fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!("SELECT {} FROM connections WHERE id = ?", CONNECTION_COLUMNS),
                [id],
                Self::row_to_connection,
            )
            .optional()?;
        Ok(result)
    }

    fn get_connection_for_user(
        &self,
        id: ConnectionId,
        user_id: &str,
    ) -> Result<Option<Connection>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM connections WHERE id = ? AND user_id = ?",
                    CONNECTION_COLUMNS
                ),
                params![id, user_id],
                Self::row_to_connection,
            )
            .optional()?;
        Ok(result)
    }

    fn list_active_connections(&self) -> Result<Vec<Connection>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM connections WHERE status = 'active' ORDER BY id",
            CONNECTION_COLUMNS
        ))?;

        let connections = stmt
            .query_map([], Self::row_to_connection)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(connections)
    }

    fn update_connection(&self, connection: &Connection) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE connections SET
                access_token = ?,
                refresh_token = ?,
                token_expires_at = ?,
                status = ?,
                last_sync_at = ?,
                last_error = ?
             WHERE id = ?",
            params![
                connection.access_token,
                connection.refresh_token,
                connection.token_expires_at.map(|t| t.to_rfc3339()),
                connection.status.as_str(),
                connection.last_sync_at.map(|t| t.to_rfc3339()),
                connection.last_error,
                connection.id,
            ],
        )?;

        anyhow::ensure!(updated == 1, "Connection {} not found", connection.id);
        Ok(())
    }
}

impl MessageStore for SqliteStore {
    fn upsert_message(&self, record: MessageRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let to_json = serde_json::to_string(&record.to)?;

        // ON CONFLICT DO UPDATE rather than INSERT OR REPLACE: the latter
        // deletes the old row first, which would drop processing_status.
        conn.execute(
            "INSERT INTO messages
             (user_id, mailbox, message_id, thread_id, from_name, from_email,
              to_recipients, subject, snippet, body_text, internal_date,
              received_at, processing_status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(user_id, mailbox, message_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                from_name = excluded.from_name,
                from_email = excluded.from_email,
                to_recipients = excluded.to_recipients,
                subject = excluded.subject,
                snippet = excluded.snippet,
                body_text = excluded.body_text,
                internal_date = excluded.internal_date,
                received_at = excluded.received_at",
            params![
                record.user_id,
                record.mailbox,
                record.message_id.as_str(),
                record.thread_id,
                record.from.name,
                record.from.email,
                to_json,
                record.subject,
                record.snippet,
                record.body_text,
                record.internal_date,
                record.received_at.to_rfc3339(),
                record.processing_status.as_str(),
            ],
        )
        .context("Failed to upsert message")?;

        Ok(())
    }

    fn existing_message_ids(
        &self,
        user_id: &str,
        mailbox: &str,
        candidates: &[MessageId],
    ) -> Result<HashSet<MessageId>> {
        let conn = self.conn.lock().unwrap();
        let mut existing = HashSet::new();

        // Chunk to stay under SQLite's bound-parameter limit
        for chunk in candidates.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT message_id FROM messages
                 WHERE user_id = ? AND mailbox = ? AND message_id IN ({})",
                placeholders
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut values: Vec<&dyn rusqlite::ToSql> = vec![&user_id, &mailbox];
            for id in chunk {
                values.push(&id.0);
            }

            let found = stmt
                .query_map(&values[..], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            existing.extend(found.into_iter().map(MessageId::new));
        }

        Ok(existing)
    }

    fn get_message(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
    ) -> Result<Option<MessageRecord>> {
        let conn = self.conn.lock().unwrap();
        let result = conn
            .query_row(
                &format!(
                    "SELECT {} FROM messages
                     WHERE user_id = ? AND mailbox = ? AND message_id = ?",
                    MESSAGE_COLUMNS
                ),
                params![user_id, mailbox, id.as_str()],
                Self::row_to_record,
            )
            .optional()?;
        Ok(result)
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
        let conn = self.conn.lock().unwrap();
        let direction = match sort {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages
             WHERE user_id = ? AND mailbox = ? AND received_at >= ? AND received_at < ?
             ORDER BY received_at {} LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS, direction
        ))?;

        let records = stmt
            .query_map(
                params![
                    user_id,
                    mailbox,
                    from.to_rfc3339(),
                    to.to_rfc3339(),
                    limit as i64,
                    offset as i64,
                ],
                Self::row_to_record,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    fn count_messages(&self, user_id: &str, mailbox: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE user_id = ? AND mailbox = ?",
            params![user_id, mailbox],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn set_processing_status(
        &self,
        user_id: &str,
        mailbox: &str,
        id: &MessageId,
        status: ProcessingStatus,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE messages SET processing_status = ?
             WHERE user_id = ? AND mailbox = ? AND message_id = ?",
            params![status.as_str(), user_id, mailbox, id.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailAddress;
    use tempfile::TempDir;

    fn make_record(id: &str, age_hours: i64) -> MessageRecord {
        let received_at = Utc::now() - chrono::Duration::hours(age_hours);
        MessageRecord::builder("user-1", "user@gmail.com", MessageId::new(id))
            .thread_id(format!("t-{}", id))
            .from(EmailAddress::with_name("Chase", "no-reply@chase.com"))
            .to(vec![EmailAddress::new("user@gmail.com")])
            .subject(format!("Alert {}", id))
            .snippet("You made a purchase")
            .body_text(Some("Amount: $10.00".to_string()))
            .internal_date(received_at.timestamp_millis())
            .received_at(received_at)
            .build()
    }

    #[test]
    fn test_connection_round_trip_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = SqliteStore::new(dir.path().join("sync.db")).unwrap();

        let inserted = store
            .insert_connection(Connection::new("user-1", "user@gmail.com").with_tokens(
                "at",
                Some("rt".to_string()),
                Some(Utc::now() + chrono::Duration::hours(1)),
            ))
            .unwrap();
        assert!(inserted.id > 0);

        let loaded = store.get_connection(inserted.id).unwrap().unwrap();
        assert_eq!(loaded.user_id, "user-1");
        assert_eq!(loaded.access_token.as_deref(), Some("at"));
        assert_eq!(loaded.status, ConnectionStatus::Active);
    }

    #[test]
    fn test_get_connection_for_user_checks_ownership() {
        let store = SqliteStore::in_memory().unwrap();
        let inserted = store
            .insert_connection(Connection::new("user-1", "user@gmail.com"))
            .unwrap();

        assert!(
            store
                .get_connection_for_user(inserted.id, "user-1")
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .get_connection_for_user(inserted.id, "someone-else")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_update_connection_persists_reset() {
        let store = SqliteStore::in_memory().unwrap();
        let mut conn = store
            .insert_connection(Connection::new("user-1", "user@gmail.com").with_tokens(
                "at",
                Some("rt".to_string()),
                Some(Utc::now()),
            ))
            .unwrap();

        conn.status = ConnectionStatus::Invalid;
        conn.access_token = None;
        conn.refresh_token = None;
        conn.token_expires_at = None;
        conn.last_error = Some("revoked".to_string());
        store.update_connection(&conn).unwrap();

        let loaded = store.get_connection(conn.id).unwrap().unwrap();
        assert_eq!(loaded.status, ConnectionStatus::Invalid);
        assert!(loaded.access_token.is_none());
        assert!(loaded.refresh_token.is_none());
        assert!(loaded.token_expires_at.is_none());
        assert_eq!(loaded.last_error.as_deref(), Some("revoked"));
    }

    #[test]
    fn test_list_active_connections_excludes_invalid() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .insert_connection(Connection::new("user-1", "a@gmail.com"))
            .unwrap();
        let mut second = store
            .insert_connection(Connection::new("user-2", "b@gmail.com"))
            .unwrap();
        second.status = ConnectionStatus::Invalid;
        store.update_connection(&second).unwrap();

        let active = store.list_active_connections().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].mailbox, "a@gmail.com");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let record = make_record("m1", 1);

        store.upsert_message(record.clone()).unwrap();
        store.upsert_message(record.clone()).unwrap();
        store.upsert_message(record).unwrap();

        assert_eq!(store.count_messages("user-1", "user@gmail.com").unwrap(), 1);
    }

    #[test]
    fn test_upsert_preserves_processing_status() {
        let store = SqliteStore::in_memory().unwrap();
        let record = make_record("m1", 1);
        store.upsert_message(record.clone()).unwrap();
        store
            .set_processing_status(
                "user-1",
                "user@gmail.com",
                &MessageId::new("m1"),
                ProcessingStatus::Processed,
            )
            .unwrap();

        // Re-syncing the same message must not clobber the status
        store.upsert_message(record).unwrap();
        let loaded = store
            .get_message("user-1", "user@gmail.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded.processing_status, ProcessingStatus::Processed);
    }

    #[test]
    fn test_existing_message_ids_probe() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_message(make_record("m1", 1)).unwrap();
        store.upsert_message(make_record("m3", 3)).unwrap();

        let candidates = vec![
            MessageId::new("m1"),
            MessageId::new("m2"),
            MessageId::new("m3"),
            MessageId::new("m4"),
        ];
        let existing = store
            .existing_message_ids("user-1", "user@gmail.com", &candidates)
            .unwrap();

        assert_eq!(existing.len(), 2);
        assert!(existing.contains(&MessageId::new("m1")));
        assert!(existing.contains(&MessageId::new("m3")));
    }

    #[test]
    fn test_probe_is_scoped_to_mailbox() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_message(make_record("m1", 1)).unwrap();

        let existing = store
            .existing_message_ids("user-1", "other@gmail.com", &[MessageId::new("m1")])
            .unwrap();
        assert!(existing.is_empty());
    }

    #[test]
    fn test_list_messages_sorting_and_paging() {
        let store = SqliteStore::in_memory().unwrap();
        for (id, age) in [("m1", 3), ("m2", 2), ("m3", 1)] {
            store.upsert_message(make_record(id, age)).unwrap();
        }

        let from = Utc::now() - chrono::Duration::days(1);
        let to = Utc::now();

        let asc = store
            .list_messages("user-1", "user@gmail.com", from, to, SortOrder::Asc, 10, 0)
            .unwrap();
        assert_eq!(asc[0].message_id.as_str(), "m1");
        assert_eq!(asc[2].message_id.as_str(), "m3");

        let desc_page = store
            .list_messages("user-1", "user@gmail.com", from, to, SortOrder::Desc, 2, 1)
            .unwrap();
        assert_eq!(desc_page.len(), 2);
        assert_eq!(desc_page[0].message_id.as_str(), "m2");
    }

    #[test]
    fn test_list_messages_range_is_half_open() {
        let store = SqliteStore::in_memory().unwrap();
        let midnight = chrono::NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();

        let mut tail = make_record("tail", 0);
        tail.received_at = midnight - chrono::Duration::milliseconds(250);
        store.upsert_message(tail).unwrap();

        let mut at_bound = make_record("at-bound", 0);
        at_bound.received_at = midnight;
        store.upsert_message(at_bound).unwrap();

        let from = midnight - chrono::Duration::days(31);
        let listed = store
            .list_messages(
                "user-1",
                "user@gmail.com",
                from,
                midnight,
                SortOrder::Asc,
                10,
                0,
            )
            .unwrap();

        // The sub-second tail is in; the exact upper bound is out
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_id.as_str(), "tail");
    }
}
