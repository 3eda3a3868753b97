//! Error classification for OAuth and Gmail API failures
//!
//! All provider-string knowledge lives here. No other module is allowed to
//! pattern-match provider error text; callers pass raw errors in and act on
//! the returned taxonomy.

use std::fmt;

/// Closed taxonomy of provider/transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    /// The grant is gone; only a fresh user-driven OAuth exchange recovers
    CredentialRevoked,
    /// Client credentials are misconfigured; operator intervention required
    CredentialConfigInvalid,
    /// Transport-level failure; safe to retry later
    NetworkTransient,
    /// Anything unrecognized; treated conservatively as non-terminal
    Unknown,
}

/// Classification result for a raw provider error
#[derive(Debug, Clone)]
pub struct OAuthError {
    pub kind: OAuthErrorKind,
    /// Actionable message recorded on the connection and shown to callers
    pub message: String,
}

impl OAuthError {
    /// Only a revoked credential requires the user to reconnect
    pub fn requires_reconnection(&self) -> bool {
        self.kind == OAuthErrorKind::CredentialRevoked
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Provider signatures for a revoked or expired grant
const REVOKED_SIGNATURES: &[&str] = &[
    "invalid_grant",
    "Invalid Credentials",
    "Token has been expired or revoked",
    "account has been deleted",
    "insufficient authentication scopes",
];

/// Provider signatures for misconfigured client credentials
const CONFIG_SIGNATURES: &[&str] = &[
    "invalid_client",
    "unauthorized_client",
    "invalid_request",
    "redirect_uri_mismatch",
];

/// Transport-level signatures (ureq/io error text)
const NETWORK_SIGNATURES: &[&str] = &[
    "timed out",
    "timeout",
    "connection refused",
    "connection reset",
    "connection closed",
    "dns",
    "failed to lookup address",
    "tls",
    "network unreachable",
    "host unreachable",
    "broken pipe",
    "io error",
];

/// Classify a raw provider or transport error.
///
/// Matching is substring-based and position-independent: any occurrence of a
/// known signature anywhere in the text classifies, regardless of surrounding
/// context or error codes. Revoked signatures win over config ones because a
/// revoked grant is the more specific, terminal outcome.
pub fn classify(raw: &str) -> OAuthError {
    if contains_any(raw, REVOKED_SIGNATURES) {
        return OAuthError {
            kind: OAuthErrorKind::CredentialRevoked,
            message: "Gmail authorization was revoked or expired; reconnect your account"
                .to_string(),
        };
    }

    if contains_any(raw, CONFIG_SIGNATURES) {
        return OAuthError {
            kind: OAuthErrorKind::CredentialConfigInvalid,
            message: "OAuth client configuration rejected by provider".to_string(),
        };
    }

    if contains_any_ci(raw, NETWORK_SIGNATURES) {
        return OAuthError {
            kind: OAuthErrorKind::NetworkTransient,
            message: "Temporary network failure talking to Gmail; retry later".to_string(),
        };
    }

    OAuthError {
        kind: OAuthErrorKind::Unknown,
        message: format!("Unrecognized Gmail error: {}", truncate(raw, 200)),
    }
}

/// Classify an error value, including its full source chain
pub fn classify_error(err: &anyhow::Error) -> OAuthError {
    classify(&format!("{:#}", err))
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn contains_any_ci(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|n| lower.contains(n))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
