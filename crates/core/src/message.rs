//! Conversation and session-memory domain types.
//!
//! Messages are owned by the host application; the pipeline only reads them.
//! `SessionMemory` is the one record the pipeline writes per conversation.

use crate::chunk::TenantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who wrote a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end customer
    Customer,
    /// The AI assistant or a human agent answering for the business
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Assistant => "Assistant",
        }
    }
}

/// A single message in a customer conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn customer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Customer,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// One transcript line: `Customer: ...`.
    pub fn as_line(&self) -> String {
        format!("{}: {}", self.role.label(), self.content.trim())
    }
}

/// Render messages as a newline-separated transcript.
pub fn transcript(messages: &[ConversationMessage]) -> String {
    messages
        .iter()
        .map(ConversationMessage::as_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Persisted per-conversation memory.
///
/// `cumulative_summary` is always replaced wholesale on update.
/// `message_count` is the number of messages already folded into the summary
/// and only ever increases. `version` is bumped on every successful save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMemory {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub cumulative_summary: String,
    #[serde(default)]
    pub message_count: usize,
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl SessionMemory {
    pub fn new(conversation_id: ConversationId, tenant_id: TenantId) -> Self {
        Self {
            conversation_id,
            tenant_id,
            cumulative_summary: String::new(),
            message_count: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Replace the summary and advance the watermark.
    ///
    /// The watermark never moves backwards.
    pub fn replace_summary(&mut self, summary: String, message_count: usize) {
        self.cumulative_summary = summary;
        self.message_count = self.message_count.max(message_count);
        self.updated_at = Utc::now();
    }
}
