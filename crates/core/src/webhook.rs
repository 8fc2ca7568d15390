//! Outbound webhook client.
//!
//! Every chat message becomes a single POST to the configured webhook, which
//! answers with a JSON object carrying the assistant reply in one of the
//! `text`, `response` or `message` fields. Lead registrations use the same
//! endpoint and their response is ignored.

use crate::lead::LeadInfo;
use crate::message::HistoryEntry;
use crate::recorder::{AUDIO_FORMAT, AUDIO_MIME, AudioPayload};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, multipart};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Reply fields checked in order; the first non-empty string wins.
pub const REPLY_FIELDS: [&str; 3] = ["text", "response", "message"];

/// Canned reply used by [`OfflineWebhook`].
pub const OFFLINE_REPLY: &str = "Obrigado pelo seu interesse! No momento, nosso chat está sendo configurado. Em breve, nossa equipe entrará em contato. Enquanto isso, você pode explorar nosso site para conhecer melhor nossas soluções.";

/// A text message as posted to the webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "messageType", rename = "text", rename_all = "camelCase")]
pub struct TextMessage {
    pub message: String,
    pub timestamp: String,
    pub history: Vec<HistoryEntry>,
    pub lead: LeadInfo,
}

/// A recorded voice message. Its wire form depends on [`AudioTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct AudioMessage {
    pub audio: AudioPayload,
    pub timestamp: String,
    pub history: Vec<HistoryEntry>,
    pub lead: LeadInfo,
}

/// Body of the base64 audio transport.
#[derive(Serialize)]
#[serde(tag = "messageType", rename = "audio", rename_all = "camelCase")]
struct AudioJsonBody<'a> {
    audio: String,
    format: &'static str,
    duration: u32,
    timestamp: &'a str,
    history: &'a [HistoryEntry],
    lead: &'a LeadInfo,
}

impl AudioMessage {
    fn json_body(&self) -> AudioJsonBody<'_> {
        AudioJsonBody {
            audio: self.audio.to_base64(),
            format: AUDIO_FORMAT,
            duration: self.audio.duration_secs,
            timestamp: &self.timestamp,
            history: &self.history,
            lead: &self.lead,
        }
    }

    fn multipart_form(&self) -> Result<multipart::Form, WebhookError> {
        let audio = multipart::Part::bytes(self.audio.bytes.clone())
            .file_name(format!("audio.{AUDIO_FORMAT}"))
            .mime_str(AUDIO_MIME)
            .map_err(|e| WebhookError::Encode(e.to_string()))?;
        let history =
            serde_json::to_string(&self.history).map_err(|e| WebhookError::Encode(e.to_string()))?;
        let lead =
            serde_json::to_string(&self.lead).map_err(|e| WebhookError::Encode(e.to_string()))?;

        Ok(multipart::Form::new()
            .part("audio", audio)
            .text("messageType", "audio")
            .text("format", AUDIO_FORMAT)
            .text("timestamp", self.timestamp.clone())
            .text("history", history)
            .text("lead", lead))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WebhookRequest {
    Text(TextMessage),
    Audio(AudioMessage),
}

impl WebhookRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookRequest::Text(_) => "text",
            WebhookRequest::Audio(_) => "audio",
        }
    }
}

/// Fire-and-forget notification sent when the lead gate opens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename = "lead_registration")]
pub struct LeadRegistration {
    pub lead: LeadInfo,
    pub timestamp: String,
}

/// The assistant reply extracted from a webhook response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookReply {
    pub text: Option<String>,
}

impl WebhookReply {
    /// Picks the first of `text`, `response` or `message` holding a string.
    /// Empty or whitespace-only values count as missing, so such a reply
    /// falls back to the default text.
    pub fn from_json(value: &Value) -> Self {
        let text = REPLY_FIELDS.iter().find_map(|field| {
            value
                .get(field)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
        });
        Self { text }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    /// The reply text, or `fallback` when the webhook sent none.
    pub fn content_or(self, fallback: &str) -> String {
        self.text.unwrap_or_else(|| fallback.to_string())
    }
}

/// How a failed send is categorized for logs and optional error bubbles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ServerUnavailable,
    RateLimited,
    Generic,
}

impl FailureKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::ServerUnavailable => {
                "Nosso servidor está indisponível no momento. Tente novamente em instantes."
            }
            FailureKind::RateLimited => {
                "Muitas mensagens em pouco tempo. Aguarde um momento e tente novamente."
            }
            FailureKind::Generic => "Desculpe, ocorreu um erro. Tente novamente mais tarde.",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::ServerUnavailable => write!(f, "server_unavailable"),
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Generic => write!(f, "generic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("Webhook responded with status {status}")]
    Status { status: u16, body: String },
    #[error("Webhook request failed: {0}")]
    Transport(String),
    #[error("Invalid webhook response: {0}")]
    Decode(String),
    #[error("Failed to encode webhook request: {0}")]
    Encode(String),
}

impl WebhookError {
    pub fn kind(&self) -> FailureKind {
        match self {
            WebhookError::Status { status, .. } if *status == 429 => FailureKind::RateLimited,
            WebhookError::Status { status, .. } if (500..600).contains(status) => {
                FailureKind::ServerUnavailable
            }
            _ => FailureKind::Generic,
        }
    }
}

/// Wire format for voice messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AudioTransport {
    /// `multipart/form-data` with the binary webm blob in the `audio` part.
    #[default]
    Multipart,
    /// JSON with the recording base64-encoded in the `audio` field.
    Base64Json,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not an audio transport")]
pub struct UnknownTransport(pub String);

impl FromStr for AudioTransport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "multipart" => Ok(AudioTransport::Multipart),
            "base64" | "json" => Ok(AudioTransport::Base64Json),
            other => Err(UnknownTransport(other.to_string())),
        }
    }
}

/// The remote endpoint that answers chat messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Webhook: Send + Sync {
    /// Posts one chat message and waits for the assistant reply.
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookReply, WebhookError>;

    /// Posts the lead registration. The response body is ignored.
    async fn register_lead(&self, registration: &LeadRegistration) -> Result<(), WebhookError>;
}

/// A [`Webhook`] reached over HTTP.
///
/// No request timeout is applied: a send waits until the remote side answers.
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: Client,
    url: String,
    audio_transport: AudioTransport,
}

impl HttpWebhook {
    pub fn new(url: impl Into<String>, audio_transport: AudioTransport) -> Self {
        Self::with_client(Client::new(), url, audio_transport)
    }

    pub fn with_client(
        client: Client,
        url: impl Into<String>,
        audio_transport: AudioTransport,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            audio_transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, WebhookError> {
        let response = builder
            .send()
            .await
            .map_err(|e| WebhookError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(status_error(status, body))
        }
    }
}

fn status_error(status: StatusCode, body: String) -> WebhookError {
    WebhookError::Status {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl Webhook for HttpWebhook {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookReply, WebhookError> {
        let builder = match request {
            WebhookRequest::Text(text) => self.client.post(&self.url).json(text),
            WebhookRequest::Audio(audio) => match self.audio_transport {
                AudioTransport::Multipart => {
                    self.client.post(&self.url).multipart(audio.multipart_form()?)
                }
                AudioTransport::Base64Json => self.client.post(&self.url).json(&audio.json_body()),
            },
        };
        debug!(kind = request.kind(), url = %self.url, "Posting message to webhook");

        let response = self.post(builder).await?;
        let body = response
            .text()
            .await
            .map_err(|e| WebhookError::Transport(e.to_string()))?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| WebhookError::Decode(e.to_string()))?;
        Ok(WebhookReply::from_json(&value))
    }

    async fn register_lead(&self, registration: &LeadRegistration) -> Result<(), WebhookError> {
        debug!(url = %self.url, "Registering lead");
        self.post(self.client.post(&self.url).json(registration))
            .await
            .map(|_| ())
    }
}

/// Stand-in used when no webhook URL is configured: every message gets the
/// same canned reply after a short delay.
#[derive(Debug, Clone)]
pub struct OfflineWebhook {
    delay: Duration,
    reply: String,
}

impl OfflineWebhook {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            reply: OFFLINE_REPLY.to_string(),
        }
    }
}

impl Default for OfflineWebhook {
    fn default() -> Self {
        Self::new(Duration::from_millis(1500))
    }
}

#[async_trait]
impl Webhook for OfflineWebhook {
    async fn send(&self, request: &WebhookRequest) -> Result<WebhookReply, WebhookError> {
        debug!(kind = request.kind(), "No webhook configured, simulating reply");
        tokio::time::sleep(self.delay).await;
        Ok(WebhookReply::text(self.reply.clone()))
    }

    async fn register_lead(&self, _registration: &LeadRegistration) -> Result<(), WebhookError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lead() -> LeadInfo {
        LeadInfo {
            name: "Ana".into(),
            email: "a@b.com".into(),
            phone: "11999998888".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_reply_field_precedence() {
        let reply = WebhookReply::from_json(&json!({"message": "m", "response": "r", "text": "t"}));
        assert_eq!(reply.text.as_deref(), Some("t"));

        let reply = WebhookReply::from_json(&json!({"message": "m", "response": "r"}));
        assert_eq!(reply.text.as_deref(), Some("r"));

        let reply = WebhookReply::from_json(&json!({"text": "", "message": "m"}));
        assert_eq!(reply.text.as_deref(), Some("m"));
    }

    #[test]
    fn test_reply_without_usable_field_falls_back() {
        for body in [
            json!({}),
            json!({"text": 42}),
            json!({"response": "   "}),
            json!(["olá"]),
            json!(null),
        ] {
            let reply = WebhookReply::from_json(&body);
            assert_eq!(reply.clone().content_or("fallback"), "fallback", "{body}");
        }
    }

    #[test]
    fn test_failure_categories() {
        let status = |status| WebhookError::Status {
            status,
            body: String::new(),
        };
        assert_eq!(status(500).kind(), FailureKind::ServerUnavailable);
        assert_eq!(status(503).kind(), FailureKind::ServerUnavailable);
        assert_eq!(status(429).kind(), FailureKind::RateLimited);
        assert_eq!(status(404).kind(), FailureKind::Generic);
        assert_eq!(
            WebhookError::Transport("refused".into()).kind(),
            FailureKind::Generic
        );
        assert_eq!(WebhookError::Decode("eof".into()).kind(), FailureKind::Generic);
    }

    #[test]
    fn test_text_message_wire_shape() {
        let msg = TextMessage {
            message: "oi".into(),
            timestamp: "2026-10-18T09:30:00.000-03:00".into(),
            history: vec![],
            lead: lead(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "messageType": "text",
                "message": "oi",
                "timestamp": "2026-10-18T09:30:00.000-03:00",
                "history": [],
                "lead": {"name": "Ana", "email": "a@b.com", "phone": "11999998888"}
            })
        );
    }

    #[test]
    fn test_lead_registration_wire_shape() {
        let registration = LeadRegistration {
            lead: lead(),
            timestamp: "t".into(),
        };
        let value = serde_json::to_value(&registration).unwrap();
        assert_eq!(value["type"], "lead_registration");
        assert_eq!(value["lead"]["name"], "Ana");
        assert_eq!(value["timestamp"], "t");
    }

    #[test]
    fn test_audio_json_body_carries_base64() {
        let msg = AudioMessage {
            audio: AudioPayload {
                bytes: b"webm".to_vec(),
                duration_secs: 3,
            },
            timestamp: "t".into(),
            history: vec![],
            lead: lead(),
        };
        let value = serde_json::to_value(msg.json_body()).unwrap();
        assert_eq!(value["messageType"], "audio");
        assert_eq!(value["audio"], "d2VibQ==");
        assert_eq!(value["format"], "webm");
        assert_eq!(value["duration"], 3);
        assert!(msg.multipart_form().is_ok());
    }

    #[test]
    fn test_audio_transport_from_str() {
        assert_eq!(
            "multipart".parse::<AudioTransport>(),
            Ok(AudioTransport::Multipart)
        );
        assert_eq!(
            "BASE64".parse::<AudioTransport>(),
            Ok(AudioTransport::Base64Json)
        );
        let err = "ftp".parse::<AudioTransport>().unwrap_err();
        assert_eq!(err, UnknownTransport("ftp".to_string()));
        assert_eq!(err.to_string(), "'ftp' is not an audio transport");
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_webhook_replies_after_delay() {
        let webhook = OfflineWebhook::default();
        let request = WebhookRequest::Text(TextMessage {
            message: "oi".into(),
            timestamp: "t".into(),
            history: vec![],
            lead: lead(),
        });
        let started = tokio::time::Instant::now();
        let reply = webhook.send(&request).await.unwrap();
        assert_eq!(reply.text.as_deref(), Some(OFFLINE_REPLY));
        assert!(started.elapsed() >= Duration::from_millis(1500));
    }
}
