//! Gmail API HTTP client
//!
//! Uses synchronous HTTP (ureq) to be executor-agnostic. Non-2xx responses
//! are surfaced as errors carrying the provider's body text so the central
//! error classifier can inspect them; no classification happens here.

use anyhow::{Context, Result, bail};
use std::time::Duration;
use ureq::Agent;

use super::api::{GmailMessage, ListMessagesResponse, MessageRef, ModifyMessageRequest,
                 ProfileResponse};
use super::MailProvider;
use crate::config::SyncSettings;
use crate::models::MessageId;

/// Gmail API client
pub struct GmailClient {
    agent: Agent,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Listing ceiling accepted by the API per page
    const MAX_RESULTS_CEILING: usize = 500;

    /// Create a new Gmail client with an explicit per-call timeout
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }

    /// Create a new Gmail client using the configured HTTP timeout
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self::new(settings.http_timeout())
    }

    /// Turn a non-2xx response into an error carrying the body text
    fn status_error(status: u16, body: String, what: &str) -> anyhow::Error {
        anyhow::anyhow!("Gmail API {} failed with status {}: {}", what, status, body)
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl MailProvider for GmailClient {
    fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MessageRef>> {
        let url = format!(
            "{}/users/me/messages?maxResults={}&q={}",
            Self::BASE_URL,
            max_results.min(Self::MAX_RESULTS_CEILING),
            urlencoding::encode(query),
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list messages request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!(Self::status_error(status, body, "list"));
        }

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list.messages.unwrap_or_default())
    }

    fn get_message(&self, access_token: &str, id: &MessageId) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format=full",
            Self::BASE_URL,
            id.as_str()
        );

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send get message request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!(Self::status_error(status, body, "get"));
        }

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    fn mark_as_read(&self, access_token: &str, id: &MessageId) -> Result<()> {
        let url = format!(
            "{}/users/me/messages/{}/modify",
            Self::BASE_URL,
            id.as_str()
        );

        let body = ModifyMessageRequest {
            add_label_ids: vec![],
            remove_label_ids: vec!["UNREAD".to_string()],
        };

        let mut response = self
            .agent
            .post(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .send_json(&body)
            .context("Failed to send modify message request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!(Self::status_error(status, body, "modify"));
        }

        Ok(())
    }

    fn get_profile(&self, access_token: &str) -> Result<ProfileResponse> {
        let url = format!("{}/users/me/profile", Self::BASE_URL);

        let mut response = self
            .agent
            .get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send profile request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.body_mut().read_to_string().unwrap_or_default();
            bail!(Self::status_error(status, body, "profile"));
        }

        let profile: ProfileResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse profile response")?;

        Ok(profile)
    }
}
