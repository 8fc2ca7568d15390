//! Stub API Models
//!
//! Inbound payloads mirror what a chat session posts; the outbound models
//! are what the stub answers and what it records.

use chrono::{DateTime, Utc};
use leadchat_core::lead::LeadInfo;
use leadchat_core::message::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// A chat message posted as JSON, discriminated by `messageType`.
#[derive(Debug, Deserialize)]
#[serde(tag = "messageType", rename_all = "lowercase")]
pub enum InboundMessage {
    Text {
        message: String,
        timestamp: String,
        #[serde(default)]
        history: Vec<HistoryEntry>,
        lead: LeadInfo,
    },
    /// Base64 transport of a voice message.
    Audio {
        audio: String,
        format: String,
        duration: u32,
        timestamp: String,
        #[serde(default)]
        history: Vec<HistoryEntry>,
        lead: LeadInfo,
    },
}

#[derive(Debug, Deserialize)]
pub struct InboundRegistration {
    pub lead: LeadInfo,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Text,
    Audio,
    LeadRegistration,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Text => write!(f, "text"),
            RequestKind::Audio => write!(f, "audio"),
            RequestKind::LeadRegistration => write!(f, "lead_registration"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Json,
    Multipart,
}

/// Summary of one request the stub received.
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRequest {
    pub kind: RequestKind,
    pub transport: Transport,
    pub lead_name: String,
    pub lead_email: String,
    pub message: Option<String>,
    pub audio_bytes: Option<usize>,
    pub audio_format: Option<String>,
    /// Only the base64 transport carries a duration.
    pub audio_duration_seconds: Option<u32>,
    pub history_len: usize,
    pub timestamp: String,
    pub received_at: DateTime<Utc>,
}

impl ReceivedRequest {
    pub fn new(kind: RequestKind, transport: Transport, lead: &LeadInfo, timestamp: String) -> Self {
        Self {
            kind,
            transport,
            lead_name: lead.name.clone(),
            lead_email: lead.email.clone(),
            message: None,
            audio_bytes: None,
            audio_format: None,
            audio_duration_seconds: None,
            history_len: 0,
            timestamp,
            received_at: Utc::now(),
        }
    }

    /// The canned assistant answer for this request.
    pub fn reply_text(&self) -> String {
        match (self.kind, &self.message, self.audio_bytes) {
            (RequestKind::Text, Some(message), _) => {
                format!("Olá, {}! Recebemos sua mensagem: \"{}\"", self.lead_name, message)
            }
            (RequestKind::Audio, _, Some(bytes)) => {
                format!("Recebemos seu áudio ({bytes} bytes). Em breve retornaremos.")
            }
            _ => "Recebido.".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReplyBody {
    #[schema(example = "Olá, Ana! Recebemos sua mensagem: \"oi\"")]
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
