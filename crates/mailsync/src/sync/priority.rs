//! Priority sender pass
//!
//! Polls every active connection for unread mail from the configured
//! priority senders, stores what is new, hands each new message to the
//! processor, and marks handled mail as read. One bad connection never
//! blocks the rest; its error is captured in that connection's entry.

use anyhow::{Context, Result};

use super::SyncEngine;
use crate::models::{Connection, ConnectionId, ProcessingStatus};
use crate::gmail::normalize_message;

/// Outcome of the priority pass for one connection
#[derive(Debug, Default)]
pub struct ConnectionPassResult {
    pub connection_id: ConnectionId,
    pub mailbox: String,
    /// Unread priority messages the provider listed
    pub found: usize,
    /// Messages newly fetched and stored this pass
    pub stored: usize,
    /// Messages handed to the processor successfully
    pub processed: usize,
    pub marked_read: usize,
    /// Per-message failures that did not abort the connection
    pub message_errors: usize,
    /// Set when the connection could not be synced at all
    pub error: Option<String>,
}

impl SyncEngine {
    /// Poll all active connections for unread priority-sender mail
    ///
    /// Returns one entry per active connection. Skips the whole pass when
    /// no priority senders are configured.
    pub fn priority_pass(&self) -> Result<Vec<ConnectionPassResult>> {
        let senders = &self.settings().priority_senders;
        if senders.is_empty() {
            log::debug!("No priority senders configured; skipping priority pass");
            return Ok(Vec::new());
        }

        let connections = self
            .connections()
            .list_active_connections()
            .context("Failed to list active connections")?;

        let query = format!("is:unread from:({})", senders.join(" OR "));

        let mut results = Vec::with_capacity(connections.len());
        for mut connection in connections {
            let mut entry = ConnectionPassResult {
                connection_id: connection.id,
                mailbox: connection.mailbox.clone(),
                ..Default::default()
            };

            if let Err(e) = self.sync_priority_connection(&mut connection, &query, &mut entry) {
                log::warn!(
                    "Priority pass failed for connection {}: {:#}",
                    connection.id,
                    e
                );
                entry.error = Some(format!("{:#}", e));
            }

            results.push(entry);
        }

        Ok(results)
    }

    fn sync_priority_connection(
        &self,
        connection: &mut Connection,
        query: &str,
        entry: &mut ConnectionPassResult,
    ) -> Result<()> {
        let access_token = self.refresher().ensure_fresh(connection)?;

        let refs = self.provider().list_message_ids(
            &access_token,
            query,
            self.settings().list_max_results,
        )?;
        entry.found = refs.len();

        for msg_ref in refs {
            let id = crate::models::MessageId::new(&msg_ref.id);

            let stored = match self
                .messages()
                .get_message(&connection.user_id, &connection.mailbox, &id)
            {
                Ok(record) => record,
                Err(e) => {
                    log::warn!("Failed to look up message {}: {:#}", id.as_str(), e);
                    entry.message_errors += 1;
                    continue;
                }
            };

            if let Some(record) = &stored
                && record.processing_status == ProcessingStatus::Processed
            {
                // Seen and handled before; only the unread flag is stale
                self.mark_read(&access_token, &id, entry);
                continue;
            }

            let record = if let Some(record) = stored {
                record
            } else {
                let gmail_msg = match self.provider().get_message(&access_token, &id) {
                    Ok(msg) => msg,
                    Err(e) => {
                        log::warn!("Failed to fetch message {}: {:#}", id.as_str(), e);
                        entry.message_errors += 1;
                        continue;
                    }
                };

                let record = match normalize_message(
                    gmail_msg,
                    &connection.user_id,
                    &connection.mailbox,
                ) {
                    Ok(record) => record,
                    Err(e) => {
                        log::warn!("Failed to normalize message {}: {:#}", id.as_str(), e);
                        entry.message_errors += 1;
                        continue;
                    }
                };

                if let Err(e) = self.messages().upsert_message(record.clone()) {
                    log::warn!("Failed to store message {}: {:#}", id.as_str(), e);
                    entry.message_errors += 1;
                    continue;
                }
                entry.stored += 1;
                record
            };

            // Processing is best-effort; a failed processor never blocks the
            // read-marking below
            let status = match self.processor().process(&record) {
                Ok(()) => {
                    entry.processed += 1;
                    ProcessingStatus::Processed
                }
                Err(e) => {
                    log::warn!("Processor failed for message {}: {:#}", id.as_str(), e);
                    entry.message_errors += 1;
                    ProcessingStatus::Failed
                }
            };

            if let Err(e) = self.messages().set_processing_status(
                &connection.user_id,
                &connection.mailbox,
                &id,
                status,
            ) {
                log::warn!(
                    "Failed to record processing status for {}: {:#}",
                    id.as_str(),
                    e
                );
                entry.message_errors += 1;
            }

            if self.settings().mark_priority_read {
                self.mark_read(&access_token, &id, entry);
            }
        }

        connection.last_sync_at = Some(chrono::Utc::now());
        self.connections()
            .update_connection(connection)
            .context("Failed to record sync time")?;

        Ok(())
    }

    fn mark_read(
        &self,
        access_token: &str,
        id: &crate::models::MessageId,
        entry: &mut ConnectionPassResult,
    ) {
        match self.provider().mark_as_read(access_token, id) {
            Ok(()) => entry.marked_read += 1,
            Err(e) => {
                log::warn!("Failed to mark {} as read: {:#}", id.as_str(), e);
                entry.message_errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncSettings;
    use crate::gmail::MailProvider;
    use crate::gmail::api::{
        GmailMessage, Header, MessageBody, MessagePayload, MessageRef, ProfileResponse,
    };
    use crate::models::{EmailAddress, MessageId, MessageRecord};
    use crate::notify::{Notification, NotificationSender};
    use crate::oauth::{OAuthApi, TokenResponse};
    use crate::storage::{ConnectionStore, InMemoryStore, MessageStore};
    use crate::sync::{MessageProcessor, NoopProcessor};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    struct FakeOAuth;

    impl OAuthApi for FakeOAuth {
        fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> Result<TokenResponse> {
            unimplemented!("not used by priority tests")
        }

        fn refresh_token(&self, _refresh_token: &str) -> Result<TokenResponse> {
            Ok(TokenResponse {
                access_token: "fresh".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
                expiry_date: None,
            })
        }
    }

    struct SilentNotifier;

    impl NotificationSender for SilentNotifier {
        fn send(&self, _user_id: &str, _notification: &Notification) -> Result<()> {
            Ok(())
        }
    }

    /// Provider with a fixed unread listing; records mark-as-read calls
    struct PriorityProvider {
        unread: Vec<String>,
        failing_fetch: HashSet<String>,
        marked: Mutex<Vec<String>>,
    }

    impl PriorityProvider {
        fn new(unread: &[&str]) -> Self {
            Self {
                unread: unread.iter().map(|s| s.to_string()).collect(),
                failing_fetch: HashSet::new(),
                marked: Mutex::new(Vec::new()),
            }
        }
    }

    impl MailProvider for PriorityProvider {
        fn list_message_ids(
            &self,
            _access_token: &str,
            query: &str,
            _max_results: usize,
        ) -> Result<Vec<MessageRef>> {
            assert!(query.starts_with("is:unread from:("));
            Ok(self
                .unread
                .iter()
                .map(|id| MessageRef {
                    id: id.clone(),
                    thread_id: format!("t-{}", id),
                })
                .collect())
        }

        fn get_message(&self, _access_token: &str, id: &MessageId) -> Result<GmailMessage> {
            if self.failing_fetch.contains(id.as_str()) {
                anyhow::bail!("Gmail API get failed with status 500: backend error");
            }
            Ok(GmailMessage {
                id: id.as_str().to_string(),
                thread_id: format!("t-{}", id.as_str()),
                label_ids: Some(vec!["UNREAD".to_string()]),
                snippet: "snippet".to_string(),
                internal_date: "1704067200000".to_string(),
                payload: Some(MessagePayload {
                    headers: Some(vec![Header {
                        name: "From".to_string(),
                        value: "alerts@bank.com".to_string(),
                    }]),
                    body: Some(MessageBody {
                        size: Some(0),
                        data: None,
                    }),
                    parts: None,
                    mime_type: Some("text/plain".to_string()),
                }),
            })
        }

        fn mark_as_read(&self, _access_token: &str, id: &MessageId) -> Result<()> {
            self.marked.lock().unwrap().push(id.as_str().to_string());
            Ok(())
        }

        fn get_profile(&self, _access_token: &str) -> Result<ProfileResponse> {
            unimplemented!("not used by priority tests")
        }
    }

    struct FailingProcessor;

    impl MessageProcessor for FailingProcessor {
        fn process(&self, _record: &MessageRecord) -> Result<()> {
            anyhow::bail!("extraction pipeline unavailable")
        }
    }

    fn settings() -> SyncSettings {
        SyncSettings {
            priority_senders: vec!["alerts@bank.com".to_string()],
            ..Default::default()
        }
    }

    fn engine_with(
        provider: Arc<PriorityProvider>,
        store: Arc<InMemoryStore>,
        processor: Arc<dyn MessageProcessor>,
        settings: SyncSettings,
    ) -> SyncEngine {
        SyncEngine::new(
            provider,
            Arc::new(FakeOAuth),
            store.clone(),
            store,
            Arc::new(SilentNotifier),
            processor,
            settings,
        )
    }

    fn seed_connection(store: &InMemoryStore) -> crate::models::Connection {
        let conn = crate::models::Connection::new("user-1", "user@gmail.com").with_tokens(
            "tok",
            Some("refresh".to_string()),
            Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        );
        store.insert_connection(conn).unwrap()
    }

    #[test]
    fn test_skips_when_no_priority_senders() {
        let provider = Arc::new(PriorityProvider::new(&["m1"]));
        let store = Arc::new(InMemoryStore::new());
        seed_connection(&store);

        let engine = engine_with(
            provider,
            store,
            Arc::new(NoopProcessor),
            SyncSettings::default(),
        );
        assert!(engine.priority_pass().unwrap().is_empty());
    }

    #[test]
    fn test_new_messages_stored_processed_and_marked_read() {
        let provider = Arc::new(PriorityProvider::new(&["m1", "m2"]));
        let store = Arc::new(InMemoryStore::new());
        seed_connection(&store);

        let engine = engine_with(
            provider.clone(),
            store.clone(),
            Arc::new(NoopProcessor),
            settings(),
        );
        let results = engine.priority_pass().unwrap();

        assert_eq!(results.len(), 1);
        let entry = &results[0];
        assert_eq!(entry.found, 2);
        assert_eq!(entry.stored, 2);
        assert_eq!(entry.processed, 2);
        assert_eq!(entry.marked_read, 2);
        assert_eq!(entry.message_errors, 0);
        assert!(entry.error.is_none());

        assert_eq!(store.count_messages("user-1", "user@gmail.com").unwrap(), 2);
        let m1 = store
            .get_message("user-1", "user@gmail.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(m1.processing_status, ProcessingStatus::Processed);
    }

    #[test]
    fn test_processor_failure_does_not_block_mark_read() {
        let provider = Arc::new(PriorityProvider::new(&["m1"]));
        let store = Arc::new(InMemoryStore::new());
        seed_connection(&store);

        let engine = engine_with(
            provider.clone(),
            store.clone(),
            Arc::new(FailingProcessor),
            settings(),
        );
        let results = engine.priority_pass().unwrap();

        let entry = &results[0];
        assert_eq!(entry.stored, 1);
        assert_eq!(entry.processed, 0);
        assert_eq!(entry.message_errors, 1);
        // Still marked read so a broken processor cannot spam the user
        assert_eq!(entry.marked_read, 1);

        let m1 = store
            .get_message("user-1", "user@gmail.com", &MessageId::new("m1"))
            .unwrap()
            .unwrap();
        assert_eq!(m1.processing_status, ProcessingStatus::Failed);
    }

    #[test]
    fn test_already_processed_message_only_marked_read() {
        let provider = Arc::new(PriorityProvider::new(&["m1"]));
        let store = Arc::new(InMemoryStore::new());
        seed_connection(&store);

        store
            .upsert_message(
                MessageRecord::builder("user-1", "user@gmail.com", MessageId::new("m1"))
                    .from(EmailAddress::new("alerts@bank.com"))
                    .processing_status(ProcessingStatus::Processed)
                    .build(),
            )
            .unwrap();

        let engine = engine_with(
            provider.clone(),
            store.clone(),
            Arc::new(NoopProcessor),
            settings(),
        );
        let results = engine.priority_pass().unwrap();

        let entry = &results[0];
        assert_eq!(entry.found, 1);
        assert_eq!(entry.stored, 0);
        assert_eq!(entry.processed, 0);
        assert_eq!(entry.marked_read, 1);
        assert_eq!(provider.marked.lock().unwrap().as_slice(), ["m1"]);
    }

    #[test]
    fn test_fetch_failure_counts_but_continues() {
        let mut provider = PriorityProvider::new(&["m1", "m2"]);
        provider.failing_fetch.insert("m1".to_string());
        let provider = Arc::new(provider);

        let store = Arc::new(InMemoryStore::new());
        seed_connection(&store);

        let engine = engine_with(
            provider,
            store.clone(),
            Arc::new(NoopProcessor),
            settings(),
        );
        let results = engine.priority_pass().unwrap();

        let entry = &results[0];
        assert_eq!(entry.found, 2);
        assert_eq!(entry.stored, 1);
        assert_eq!(entry.message_errors, 1);
        assert!(entry.error.is_none());
        assert_eq!(store.count_messages("user-1", "user@gmail.com").unwrap(), 1);
    }

    #[test]
    fn test_connection_failure_is_isolated() {
        // Two connections; the first has no refresh token and an expired
        // access token, so it fails outright. The second still syncs.
        let provider = Arc::new(PriorityProvider::new(&["m1"]));
        let store = Arc::new(InMemoryStore::new());

        let broken = crate::models::Connection::new("user-1", "broken@gmail.com").with_tokens(
            "stale",
            None,
            Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        );
        store.insert_connection(broken).unwrap();

        let healthy = crate::models::Connection::new("user-2", "healthy@gmail.com").with_tokens(
            "tok",
            Some("refresh".to_string()),
            Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        );
        store.insert_connection(healthy).unwrap();

        let engine = engine_with(
            provider,
            store.clone(),
            Arc::new(NoopProcessor),
            settings(),
        );
        let results = engine.priority_pass().unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].error.is_some());
        assert_eq!(results[0].stored, 0);
        assert!(results[1].error.is_none());
        assert_eq!(results[1].stored, 1);
        assert_eq!(
            store.count_messages("user-2", "healthy@gmail.com").unwrap(),
            1
        );
    }
}
