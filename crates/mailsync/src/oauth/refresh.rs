//! Access-token refresh ahead of expiry
//!
//! Refresh is triggered by a time buffer, not a lock: the token is rotated
//! while it is still valid so in-flight requests never see a mid-operation
//! 401. Two concurrent callers may both refresh the same connection; the
//! last writer's token values win.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use super::classify::classify_error;
use super::reset::ConnectionResetter;
use super::OAuthApi;
use crate::error::SyncError;
use crate::models::Connection;
use crate::storage::ConnectionStore;

/// Default refresh buffer: rotate when less than five minutes remain
pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 300;

/// Whether the connection's access token is due for refresh.
///
/// A missing token or expiry always refreshes; otherwise refresh when the
/// provider-reported expiry falls inside the buffer window.
pub fn needs_refresh(connection: &Connection, buffer: Duration, now: DateTime<Utc>) -> bool {
    match (&connection.access_token, connection.token_expires_at) {
        (Some(_), Some(expires_at)) => expires_at <= now + buffer,
        _ => true,
    }
}

/// Rotates access tokens and drives terminal resets on revocation
pub struct TokenRefresher {
    oauth: Arc<dyn OAuthApi>,
    connections: Arc<dyn ConnectionStore>,
    resetter: ConnectionResetter,
    buffer: Duration,
}

impl TokenRefresher {
    pub fn new(
        oauth: Arc<dyn OAuthApi>,
        connections: Arc<dyn ConnectionStore>,
        resetter: ConnectionResetter,
    ) -> Self {
        Self {
            oauth,
            connections,
            resetter,
            buffer: Duration::seconds(DEFAULT_REFRESH_BUFFER_SECS),
        }
    }

    pub fn with_buffer_secs(mut self, secs: i64) -> Self {
        self.buffer = Duration::seconds(secs);
        self
    }

    /// Return a usable access token, refreshing first if the current one is
    /// inside the buffer window. Mutates and persists `connection` on refresh.
    pub fn ensure_fresh(&self, connection: &mut Connection) -> Result<String, SyncError> {
        if !needs_refresh(connection, self.buffer, Utc::now())
            && let Some(token) = &connection.access_token
        {
            return Ok(token.clone());
        }
        self.refresh(connection)
    }

    /// Force a refresh against the OAuth provider.
    ///
    /// On success the new access token, the provider's stated expiry, and a
    /// rotated refresh token (only if one was issued) are persisted. On a
    /// terminal classification the connection is reset and the caller gets
    /// a reauthorization-required signal; every other failure propagates as
    /// transient with no state mutation.
    pub fn refresh(&self, connection: &mut Connection) -> Result<String, SyncError> {
        let Some(refresh_token) = connection.refresh_token.clone() else {
            // No refresh token to exchange: the credential is unrecoverable
            log::warn!(
                "Connection {} has no refresh token; resetting",
                connection.id
            );
            let error = super::classify("Token has been expired or revoked");
            self.apply_reset(connection, &error);
            return Err(SyncError::ReauthRequired(connection.id));
        };

        match self.oauth.refresh_token(&refresh_token) {
            Ok(token) => {
                let now = Utc::now();
                connection.access_token = Some(token.access_token.clone());
                connection.token_expires_at = token.expiry(now);
                // Rotation is optional per call; keep the old token otherwise
                if let Some(rotated) = token.refresh_token {
                    connection.refresh_token = Some(rotated);
                }
                self.connections.update_connection(connection)?;

                log::debug!(
                    "Refreshed access token for connection {} (expires {:?})",
                    connection.id,
                    connection.token_expires_at
                );
                Ok(token.access_token)
            }
            Err(e) => {
                let classified = classify_error(&e);
                if classified.requires_reconnection() {
                    log::warn!(
                        "Connection {} credential revoked: {}",
                        connection.id,
                        classified.message
                    );
                    self.apply_reset(connection, &classified);
                    Err(SyncError::ReauthRequired(connection.id))
                } else {
                    log::warn!(
                        "Transient token refresh failure for connection {}: {}",
                        connection.id,
                        classified.message
                    );
                    Err(SyncError::TokenRefresh(classified.message))
                }
            }
        }
    }

    /// Run the terminal reset and fold the result back into the caller's
    /// connection. A reset persistence failure is logged; the caller still
    /// receives the reauthorization signal either way.
    fn apply_reset(&self, connection: &mut Connection, error: &super::OAuthError) {
        match self.resetter.reset(connection.id, error) {
            Ok(reset) => *connection = reset,
            Err(e) => log::error!(
                "Failed to reset connection {} after terminal error: {:#}",
                connection.id,
                e
            ),
        }
    }
}
