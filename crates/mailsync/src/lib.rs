//! Mailsync crate - Gmail sync and OAuth lifecycle engine
//!
//! This crate provides the platform-independent sync engine:
//! - Domain models (Connection, MessageRecord, EmailAddress)
//! - Gmail API client and OAuth token lifecycle (refresh, terminal reset)
//! - Storage trait abstractions with SQLite and in-memory implementations
//! - Manual (windowed, paginated) and priority (unread polling) sync passes
//!
//! This crate has zero UI dependencies; callers wire it behind whatever
//! surface they need (CLI, HTTP, scheduler).

pub mod config;
pub mod error;
pub mod gmail;
pub mod models;
pub mod notify;
pub mod oauth;
pub mod storage;
pub mod sync;

pub use config::{GmailCredentials, SyncSettings};
pub use error::SyncError;
pub use gmail::{GmailClient, MailProvider, api::ProfileResponse};
pub use models::{
    Connection, ConnectionId, ConnectionStatus, EmailAddress, MessageId, MessageRecord,
    ProcessingStatus,
};
pub use notify::{LogNotifier, Notification, NotificationSender};
pub use oauth::{
    // Lifecycle components
    ConnectionResetter, GoogleOAuth, OAuthApi, OAuthError, OAuthErrorKind, TokenRefresher,
    TokenResponse,
    // Classification and refresh policy
    DEFAULT_REFRESH_BUFFER_SECS, classify, connect_account, needs_refresh,
};
pub use storage::{ConnectionStore, InMemoryStore, MessageStore, SortOrder, SqliteStore};
pub use sync::{
    // Pass entry points live on the engine
    SyncEngine,
    // Manual pass request/response
    ManualSyncRequest, ManualSyncResponse, SyncPassStats,
    // Priority pass
    ConnectionPassResult,
    // Processing hook
    MessageProcessor, NoopProcessor,
};
