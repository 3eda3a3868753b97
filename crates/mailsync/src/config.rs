//! Configuration for the sync engine
//!
//! OAuth client credentials load from (in order of priority):
//! 1. JSON file (Google Cloud Console format, ~/.config/ledgermail/)
//! 2. Runtime environment variables
//!
//! Engine tunables live in [`SyncSettings`], loadable from the shared config
//! directory with sensible defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Credentials filename in the Ledgermail config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// Settings filename in the Ledgermail config directory
const SETTINGS_FILE: &str = "sync-settings.json";

/// OAuth client credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials from the default config file, falling back to
    /// environment variables
    pub fn load() -> Result<Self> {
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }
        Self::from_env()
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }
}

/// Engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Refresh the access token when fewer than this many seconds remain
    pub refresh_buffer_secs: i64,
    /// Ceiling on ids fetched in a single remote listing call
    pub list_max_results: usize,
    /// Page size used when a request omits one
    pub default_page_size: usize,
    /// Hard cap on requested page size
    pub max_page_size: usize,
    /// Per-call HTTP timeout for provider requests
    pub http_timeout_secs: u64,
    /// Senders polled by the priority pass
    pub priority_senders: Vec<String>,
    /// Whether the priority pass marks handled messages read in the mailbox
    pub mark_priority_read: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: 300,
            list_max_results: 500,
            default_page_size: 50,
            max_page_size: 100,
            http_timeout_secs: 30,
            priority_senders: Vec::new(),
            mark_priority_read: true,
        }
    }
}

impl SyncSettings {
    /// The configured per-call HTTP timeout, for the ureq agents
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Load settings from the config directory, defaulting when absent
    pub fn load() -> Self {
        if config::config_exists(SETTINGS_FILE) {
            match config::load_json(SETTINGS_FILE) {
                Ok(settings) => return settings,
                Err(e) => log::warn!("Failed to load sync settings, using defaults: {:#}", e),
            }
        }
        Self::default()
    }
}
