//! Chat Transcript Models
//!
//! Messages are append-only. The only mutation allowed after a message is
//! appended is the forward move of a user message's delivery status from
//! `Sent` to `Read`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a message within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// Simulated delivery status of a user message. Ordered: `Sent < Read`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Read,
}

/// Recorded audio attached to a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioAttachment {
    /// Base64 of the encoded webm recording, without a data-URL prefix.
    pub payload: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    /// ISO-8601 in the chat offset, see [`crate::clock::format_timestamp`].
    pub timestamp: String,
    /// Only user messages carry a status.
    pub status: Option<DeliveryStatus>,
    pub audio: Option<AudioAttachment>,
}

impl Message {
    pub fn user(content: impl Into<String>, timestamp: String) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::User,
            content: content.into(),
            timestamp,
            status: Some(DeliveryStatus::Sent),
            audio: None,
        }
    }

    pub fn assistant(content: impl Into<String>, timestamp: String) -> Self {
        Self {
            id: MessageId::new(),
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp,
            status: None,
            audio: None,
        }
    }

    pub fn with_audio(mut self, audio: AudioAttachment) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn is_audio(&self) -> bool {
        self.audio.is_some()
    }
}

/// The shape a message takes inside the `history` sent to the webhook.
///
/// Audio bytes are never echoed back; only the flag and duration are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: MessageId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DeliveryStatus>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_audio: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration_seconds: Option<u32>,
}

impl From<&Message> for HistoryEntry {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            role: msg.role,
            content: msg.content.clone(),
            timestamp: msg.timestamp.clone(),
            status: msg.status,
            is_audio: msg.is_audio(),
            audio_duration_seconds: msg.audio.as_ref().map(|a| a.duration_secs),
        }
    }
}

/// Ordered, append-only message log of a session.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        debug_assert!(self.get(message.id).is_none(), "duplicate message id");
        self.messages.push(message);
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Moves a user message to `Read`.
    ///
    /// Returns `true` only when the status actually changed; unknown ids,
    /// assistant messages and already-read messages are left untouched.
    pub fn mark_read(&mut self, id: MessageId) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(msg) if msg.status == Some(DeliveryStatus::Sent) => {
                msg.status = Some(DeliveryStatus::Read);
                true
            }
            _ => false,
        }
    }

    /// The last `window` messages in wire form, oldest first.
    pub fn history(&self, window: usize) -> Vec<HistoryEntry> {
        let start = self.messages.len().saturating_sub(window);
        self.messages[start..].iter().map(HistoryEntry::from).collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
