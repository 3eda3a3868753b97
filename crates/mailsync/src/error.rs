//! Orchestrator-level error type
//!
//! Distinguishes terminal credential failures (caller must prompt the user
//! to reconnect) from transient ones (caller may retry), with stable machine
//! codes for the HTTP layer that sits above this engine.

use crate::models::ConnectionId;

/// Errors surfaced by sync passes and token refresh
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Request validation failed (missing fields, page size over cap, ...)
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The connection does not exist or is not owned by the requester
    #[error("connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    /// Terminal: the credential was revoked and the connection was reset
    #[error("connection {0} requires reauthorization")]
    ReauthRequired(ConnectionId),

    /// Transient: the refresh attempt failed without touching stored state
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),

    /// Storage or other internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Stable machine code for API consumers
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::InvalidRequest(_) => "INVALID_REQUEST",
            SyncError::ConnectionNotFound(_) => "CONNECTION_NOT_FOUND",
            SyncError::ReauthRequired(_) => "GMAIL_REAUTH_REQUIRED",
            SyncError::TokenRefresh(_) => "TOKEN_REFRESH_FAILED",
            SyncError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the REST layer should map this error to
    pub fn http_status(&self) -> u16 {
        match self {
            SyncError::InvalidRequest(_) => 400,
            SyncError::ConnectionNotFound(_) => 404,
            SyncError::ReauthRequired(_) => 401,
            SyncError::TokenRefresh(_) | SyncError::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        assert_eq!(SyncError::ReauthRequired(7).code(), "GMAIL_REAUTH_REQUIRED");
        assert_eq!(SyncError::ReauthRequired(7).http_status(), 401);
        assert_eq!(
            SyncError::TokenRefresh("x".into()).code(),
            "TOKEN_REFRESH_FAILED"
        );
        assert_eq!(SyncError::TokenRefresh("x".into()).http_status(), 500);
        assert_eq!(SyncError::ConnectionNotFound(1).http_status(), 404);
        assert_eq!(SyncError::InvalidRequest("x".into()).http_status(), 400);
    }
}
