//! Outbound user notification seam
//!
//! The engine only produces notifications on terminal connection resets; the
//! actual delivery transport lives outside this crate and is injected.

use anyhow::Result;
use serde::Serialize;

/// A user-facing notification payload
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Structured payload for the client (connection id, machine code, ...)
    pub data: serde_json::Value,
}

/// Fire-and-forget notification delivery
///
/// Failures from implementations are logged by callers and never change the
/// outcome of the operation that triggered the notification.
pub trait NotificationSender: Send + Sync {
    fn send(&self, user_id: &str, notification: &Notification) -> Result<()>;
}

/// Default sender that only logs; useful for tests and headless deployments
pub struct LogNotifier;

impl NotificationSender for LogNotifier {
    fn send(&self, user_id: &str, notification: &Notification) -> Result<()> {
        log::info!(
            "[NOTIFY] user={} title={:?} body={:?}",
            user_id,
            notification.title,
            notification.body
        );
        Ok(())
    }
}
