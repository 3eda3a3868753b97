//! Message model: a locally persisted mirror of one remote message

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "Chase Alerts")
    pub name: Option<String>,
    /// Email address (e.g., "no-reply@chase.com")
    pub email: String,
}

impl EmailAddress {
    /// Create a new email address with just the email
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    /// Create a new email address with a display name
    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an email address from a string like "Chase Alerts <no-reply@chase.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        // Try to parse "Name <email>" format
        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        // Otherwise, treat the whole string as an email
        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the email address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Downstream processing status, tracked separately from sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    /// Stored but not yet handed to extraction
    Pending,
    /// Extraction completed for this message
    Processed,
    /// Extraction was attempted and failed
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processed => "processed",
            ProcessingStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processed" => ProcessingStatus::Processed,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

/// A locally stored mirror of one remote message
///
/// Exactly one record exists per (user_id, mailbox, message_id); the store
/// enforces this as an upsert conflict key, which is the engine's sole
/// idempotency guarantee against duplicate inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Owning user identifier
    pub user_id: String,
    /// Mailbox identity the message came from
    pub mailbox: String,
    /// Gmail message ID
    pub message_id: MessageId,
    /// Gmail thread ID
    pub thread_id: String,
    /// Sender's email address
    pub from: EmailAddress,
    /// Recipients (To field)
    pub to: Vec<EmailAddress>,
    /// Subject line
    pub subject: String,
    /// Short snippet provided by the provider
    pub snippet: String,
    /// Plain text body, when one could be extracted
    pub body_text: Option<String>,
    /// Gmail's internal timestamp (milliseconds since epoch)
    pub internal_date: i64,
    /// Normalized receive time derived from `internal_date`
    pub received_at: DateTime<Utc>,
    /// Downstream extraction status
    pub processing_status: ProcessingStatus,
}

impl MessageRecord {
    /// Create a new record builder
    pub fn builder(
        user_id: impl Into<String>,
        mailbox: impl Into<String>,
        message_id: MessageId,
    ) -> MessageRecordBuilder {
        MessageRecordBuilder::new(user_id.into(), mailbox.into(), message_id)
    }
}

/// Builder for creating MessageRecord instances
pub struct MessageRecordBuilder {
    user_id: String,
    mailbox: String,
    message_id: MessageId,
    thread_id: String,
    from: Option<EmailAddress>,
    to: Vec<EmailAddress>,
    subject: String,
    snippet: String,
    body_text: Option<String>,
    internal_date: i64,
    received_at: Option<DateTime<Utc>>,
    processing_status: ProcessingStatus,
}

impl MessageRecordBuilder {
    fn new(user_id: String, mailbox: String, message_id: MessageId) -> Self {
        Self {
            user_id,
            mailbox,
            message_id,
            thread_id: String::new(),
            from: None,
            to: Vec::new(),
            subject: String::new(),
            snippet: String::new(),
            body_text: None,
            internal_date: 0,
            received_at: None,
            processing_status: ProcessingStatus::Pending,
        }
    }

    pub fn thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = thread_id.into();
        self
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: Vec<EmailAddress>) -> Self {
        self.to = to;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body_text(mut self, body_text: Option<String>) -> Self {
        self.body_text = body_text;
        self
    }

    pub fn internal_date(mut self, internal_date: i64) -> Self {
        self.internal_date = internal_date;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn processing_status(mut self, status: ProcessingStatus) -> Self {
        self.processing_status = status;
        self
    }

    pub fn build(self) -> MessageRecord {
        MessageRecord {
            user_id: self.user_id,
            mailbox: self.mailbox,
            message_id: self.message_id,
            thread_id: self.thread_id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com")),
            to: self.to,
            subject: self.subject,
            snippet: self.snippet,
            body_text: self.body_text,
            internal_date: self.internal_date,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            processing_status: self.processing_status,
        }
    }
}
