//! Connection model: one OAuth credential pairing a user with a mailbox

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Database identifier for a connection
pub type ConnectionId = i64;

/// Lifecycle status of a connection
///
/// `Active` connections can sync. `Invalid` is terminal: the tokens have
/// been cleared and only a fresh OAuth exchange creates a usable connection
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Active,
    Invalid,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Active => "active",
            ConnectionStatus::Invalid => "invalid",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "invalid" => ConnectionStatus::Invalid,
            _ => ConnectionStatus::Active,
        }
    }
}

/// A stored OAuth credential pairing one user with one Gmail mailbox
///
/// Created on a successful OAuth exchange. Mutated by the token refresher
/// (access token rotation) and the connection resetter (terminal
/// invalidation). Never hard-deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    /// Unique integer identifier (database primary key)
    pub id: ConnectionId,
    /// Owning user identifier
    pub user_id: String,
    /// Mailbox identity (the Gmail address)
    pub mailbox: String,
    /// Current bearer token, if any
    pub access_token: Option<String>,
    /// Long-lived refresh token; cleared only on terminal reset
    pub refresh_token: Option<String>,
    /// Provider-reported expiry of the access token, never synthesized
    pub token_expires_at: Option<DateTime<Utc>>,
    /// Lifecycle status
    pub status: ConnectionStatus,
    /// When the last successful sync pass completed
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Last classified error text, for diagnostics
    pub last_error: Option<String>,
    /// When the connection was created
    pub created_at: DateTime<Utc>,
}

impl Connection {
    /// Create a new active connection (id will be assigned by the store)
    pub fn new(user_id: impl Into<String>, mailbox: impl Into<String>) -> Self {
        Self {
            id: 0, // Will be set by the store
            user_id: user_id.into(),
            mailbox: mailbox.into(),
            access_token: None,
            refresh_token: None,
            token_expires_at: None,
            status: ConnectionStatus::Active,
            last_sync_at: None,
            last_error: None,
            created_at: Utc::now(),
        }
    }

    /// Set the token triple from an OAuth exchange
    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = Some(access_token.into());
        self.refresh_token = refresh_token;
        self.token_expires_at = expires_at;
        self
    }

    /// Whether the connection is usable for sync passes
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }
}
