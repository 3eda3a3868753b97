//! Terminal connection reset
//!
//! Transitions a connection to its terminal invalid state: tokens are
//! cleared, the classified error is recorded, and the user is told to
//! reconnect when the classification demands it.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::classify::OAuthError;
use crate::models::{Connection, ConnectionId, ConnectionStatus};
use crate::notify::{Notification, NotificationSender};
use crate::storage::ConnectionStore;

/// Drives the invalidate-and-notify workflow for a dead credential
pub struct ConnectionResetter {
    connections: Arc<dyn ConnectionStore>,
    notifier: Arc<dyn NotificationSender>,
}

impl ConnectionResetter {
    pub fn new(
        connections: Arc<dyn ConnectionStore>,
        notifier: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            connections,
            notifier,
        }
    }

    /// Reset a connection after a terminal error.
    ///
    /// Sets status to invalid, nulls all token material (the refresh token
    /// is cleared for credential hygiene), records the classified message,
    /// and persists. The reset succeeds or fails solely on the persistence
    /// write: a notification failure is logged and swallowed.
    pub fn reset(&self, connection_id: ConnectionId, error: &OAuthError) -> Result<Connection> {
        let mut connection = self
            .connections
            .get_connection(connection_id)?
            .with_context(|| format!("Connection {} not found", connection_id))?;

        connection.status = ConnectionStatus::Invalid;
        connection.access_token = None;
        connection.refresh_token = None;
        connection.token_expires_at = None;
        connection.last_error = Some(error.message.clone());

        self.connections.update_connection(&connection)?;
        log::info!(
            "Reset connection {} ({}) after terminal error: {}",
            connection.id,
            connection.mailbox,
            error.message
        );

        if error.requires_reconnection() {
            let notification = Notification {
                title: "Gmail reconnection required".to_string(),
                body: format!(
                    "Access to {} was revoked or expired. Please reconnect your account.",
                    connection.mailbox
                ),
                data: serde_json::json!({
                    "connection_id": connection.id,
                    "mailbox": connection.mailbox,
                    "code": "GMAIL_REAUTH_REQUIRED",
                }),
            };

            if let Err(e) = self.notifier.send(&connection.user_id, &notification) {
                log::warn!(
                    "Failed to notify user {} about connection {} reset: {:#}",
                    connection.user_id,
                    connection.id,
                    e
                );
            }
        }

        Ok(connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::classify;
    use crate::storage::InMemoryStore;
    use chrono::Utc;
    use std::sync::Mutex;

    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Notification)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    impl NotificationSender for RecordingNotifier {
        fn send(&self, user_id: &str, notification: &Notification) -> Result<()> {
            if self.fail {
                anyhow::bail!("push transport unavailable");
            }
            self.sent
                .lock()
                .unwrap()
                .push((user_id.to_string(), notification.clone()));
            Ok(())
        }
    }

    fn seeded_store() -> (Arc<InMemoryStore>, ConnectionId) {
        let store = Arc::new(InMemoryStore::new());
        let conn = store
            .insert_connection(
                Connection::new("user-1", "user@gmail.com").with_tokens(
                    "at",
                    Some("rt".to_string()),
                    Some(Utc::now()),
                ),
            )
            .unwrap();
        (store, conn.id)
    }

    #[test]
    fn test_reset_clears_all_token_state() {
        let (store, id) = seeded_store();
        let notifier = Arc::new(RecordingNotifier::new(false));
        let resetter = ConnectionResetter::new(store.clone(), notifier.clone());

        let error = classify("invalid_grant");
        let reset = resetter.reset(id, &error).unwrap();

        assert_eq!(reset.status, ConnectionStatus::Invalid);
        assert!(reset.access_token.is_none());
        assert!(reset.refresh_token.is_none());
        assert!(reset.token_expires_at.is_none());
        assert_eq!(reset.last_error.as_deref(), Some(error.message.as_str()));

        // Persisted, not just in-memory
        let loaded = store.get_connection(id).unwrap().unwrap();
        assert_eq!(loaded.status, ConnectionStatus::Invalid);

        // Revocation requires reconnection, so the user was notified
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "user-1");
        assert_eq!(sent[0].1.data["code"], "GMAIL_REAUTH_REQUIRED");
    }

    #[test]
    fn test_reset_succeeds_when_notifier_fails() {
        let (store, id) = seeded_store();
        let resetter =
            ConnectionResetter::new(store.clone(), Arc::new(RecordingNotifier::new(true)));

        let error = classify("Token has been expired or revoked");
        let reset = resetter.reset(id, &error).unwrap();
        assert_eq!(reset.status, ConnectionStatus::Invalid);

        let loaded = store.get_connection(id).unwrap().unwrap();
        assert!(loaded.access_token.is_none());
        assert!(loaded.refresh_token.is_none());
    }

    #[test]
    fn test_reset_without_reconnection_skips_notification() {
        let (store, id) = seeded_store();
        let notifier = Arc::new(RecordingNotifier::new(false));
        let resetter = ConnectionResetter::new(store, notifier.clone());

        // A non-terminal classification still resets when asked, but the
        // user is not prompted to reconnect
        let error = classify("request timed out");
        resetter.reset(id, &error).unwrap();
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_unknown_connection_errors() {
        let store = Arc::new(InMemoryStore::new());
        let resetter = ConnectionResetter::new(store, Arc::new(RecordingNotifier::new(false)));
        assert!(resetter.reset(999, &classify("invalid_grant")).is_err());
    }
}
