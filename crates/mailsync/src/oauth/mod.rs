//! OAuth connection lifecycle
//!
//! This module owns the delegated-credential lifecycle:
//! - [`classify`] maps raw provider errors into a closed taxonomy
//! - [`TokenRefresher`] rotates access tokens ahead of expiry
//! - [`ConnectionResetter`] drives the terminal invalidate-and-notify path
//! - [`authorize`] runs the initial authorization-code exchange

mod authorize;
mod classify;
mod refresh;
mod reset;

pub use authorize::connect_account;
pub use classify::{OAuthError, OAuthErrorKind, classify};
pub use refresh::{DEFAULT_REFRESH_BUFFER_SECS, TokenRefresher, needs_refresh};
pub use reset::ConnectionResetter;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::time::Duration;
use ureq::Agent;

use crate::config::{GmailCredentials, SyncSettings};

/// Token response from the OAuth provider
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Present only when the provider rotates the refresh token
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, relative to the exchange
    pub expires_in: Option<u64>,
    /// Absolute expiry in epoch milliseconds; authoritative when present
    pub expiry_date: Option<i64>,
}

impl TokenResponse {
    /// Resolve the access-token expiry the provider stated.
    ///
    /// `expiry_date` wins when present; otherwise `now + expires_in`. Never
    /// synthesizes a fallback duration.
    pub fn expiry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if let Some(ms) = self.expiry_date
            && let Some(at) = Utc.timestamp_millis_opt(ms).single()
        {
            return Some(at);
        }
        self.expires_in
            .map(|secs| now + chrono::Duration::seconds(secs as i64))
    }
}

/// OAuth provider operations consumed by the lifecycle components
pub trait OAuthApi: Send + Sync {
    /// Exchange an authorization code for a token set
    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse>;

    /// Exchange a refresh token for a new access token
    fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Google OAuth2 token endpoint client
pub struct GoogleOAuth {
    client_id: String,
    client_secret: String,
    agent: Agent,
}

impl GoogleOAuth {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Create a new token endpoint client with an explicit per-call timeout
    pub fn new(client_id: String, client_secret: String, timeout: Duration) -> Self {
        // Non-2xx responses are read as bodies, not transport errors, so the
        // provider's error text (e.g. "invalid_grant") reaches the classifier.
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self {
            client_id,
            client_secret,
            agent,
        }
    }

    /// Create a token endpoint client from loaded credentials and settings
    pub fn from_config(credentials: &GmailCredentials, settings: &SyncSettings) -> Self {
        Self::new(
            credentials.client_id.clone(),
            credentials.client_secret.clone(),
            settings.http_timeout(),
        )
    }

    fn token_request(&self, form: Vec<(&str, &str)>, what: &str) -> Result<TokenResponse> {
        let mut response = self
            .agent
            .post(Self::TOKEN_URL)
            .send_form(form)
            .with_context(|| format!("Failed to send {} request", what))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!("OAuth {} failed with status {}: {}", what, status, body);
        }

        let token: TokenResponse = response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", what))?;

        Ok(token)
    }
}

impl OAuthApi for GoogleOAuth {
    fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        self.token_request(
            vec![
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
            ],
            "code exchange",
        )
    }

    fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(
            vec![
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            "token refresh",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_prefers_expiry_date() {
        let now = Utc::now();
        let token = TokenResponse {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            expiry_date: Some(1_704_067_200_000), // 2024-01-01T00:00:00Z
        };
        let expiry = token.expiry(now).unwrap();
        assert_eq!(expiry.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_expiry_falls_back_to_expires_in() {
        let now = Utc::now();
        let token = TokenResponse {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            expiry_date: None,
        };
        let expiry = token.expiry(now).unwrap();
        assert_eq!(expiry, now + chrono::Duration::seconds(3600));
    }

    #[test]
    fn test_expiry_absent_when_provider_silent() {
        let token = TokenResponse {
            access_token: "at".to_string(),
            refresh_token: None,
            expires_in: None,
            expiry_date: None,
        };
        assert!(token.expiry(Utc::now()).is_none());
    }

    #[test]
    fn test_from_config_carries_credentials() {
        let credentials = GmailCredentials {
            client_id: "id.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
        };
        let oauth = GoogleOAuth::from_config(&credentials, &SyncSettings::default());
        assert_eq!(oauth.client_id, "id.apps.googleusercontent.com");
        assert_eq!(oauth.client_secret, "secret");
    }
}
