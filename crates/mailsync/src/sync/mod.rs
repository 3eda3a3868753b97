//! Sync orchestration
//!
//! Two passes share the same components: the manual pass (user-triggered,
//! paginated over a date window) and the priority pass (unread polling of
//! configured priority senders). Both are per-call; repeated scheduling is
//! the caller's responsibility.

mod dedup;
mod fetch;
mod manual;
mod priority;
mod window;

pub use dedup::{DedupOutcome, probe_existing};
pub use fetch::{FetchOutcome, fetch_and_store};
pub use manual::{ManualSyncRequest, ManualSyncResponse, SyncPassStats};
pub use priority::ConnectionPassResult;
pub use window::{WindowPage, WindowQuery, build_query, list_window};

use anyhow::Result;
use std::sync::Arc;

use crate::config::SyncSettings;
use crate::gmail::MailProvider;
use crate::models::MessageRecord;
use crate::notify::NotificationSender;
use crate::oauth::{ConnectionResetter, OAuthApi, TokenRefresher};
use crate::storage::{ConnectionStore, MessageStore};

/// Downstream extraction hook, invoked best-effort by the priority pass
///
/// The actual extraction pipeline lives outside this crate; a failure here
/// never blocks the rest of a message's handling.
pub trait MessageProcessor: Send + Sync {
    fn process(&self, record: &MessageRecord) -> Result<()>;
}

/// Processor that does nothing; for deployments without extraction wired up
pub struct NoopProcessor;

impl MessageProcessor for NoopProcessor {
    fn process(&self, _record: &MessageRecord) -> Result<()> {
        Ok(())
    }
}

/// Composes the lifecycle and sync components over injected dependencies
pub struct SyncEngine {
    provider: Arc<dyn MailProvider>,
    connections: Arc<dyn ConnectionStore>,
    messages: Arc<dyn MessageStore>,
    processor: Arc<dyn MessageProcessor>,
    refresher: TokenRefresher,
    settings: SyncSettings,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn MailProvider>,
        oauth: Arc<dyn OAuthApi>,
        connections: Arc<dyn ConnectionStore>,
        messages: Arc<dyn MessageStore>,
        notifier: Arc<dyn NotificationSender>,
        processor: Arc<dyn MessageProcessor>,
        settings: SyncSettings,
    ) -> Self {
        let resetter = ConnectionResetter::new(connections.clone(), notifier);
        let refresher = TokenRefresher::new(oauth, connections.clone(), resetter)
            .with_buffer_secs(settings.refresh_buffer_secs);

        Self {
            provider,
            connections,
            messages,
            processor,
            refresher,
            settings,
        }
    }

    pub(crate) fn provider(&self) -> &dyn MailProvider {
        self.provider.as_ref()
    }

    pub(crate) fn connections(&self) -> &dyn ConnectionStore {
        self.connections.as_ref()
    }

    pub(crate) fn messages(&self) -> &dyn MessageStore {
        self.messages.as_ref()
    }

    pub(crate) fn processor(&self) -> &dyn MessageProcessor {
        self.processor.as_ref()
    }

    pub(crate) fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    pub(crate) fn settings(&self) -> &SyncSettings {
        &self.settings
    }
}
