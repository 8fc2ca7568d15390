//! Session tunables.
//!
//! Everything the chat flow used to read from module-level constants is
//! injected through [`ChatConfig`] when a session is built.

use crate::recorder::DEFAULT_MAX_RECORDING_SECS;
use std::time::Duration;

pub const DEFAULT_FALLBACK_REPLY: &str = "Desculpe, não consegui processar sua mensagem.";
pub const DEFAULT_AUDIO_LABEL: &str = "🎤 Mensagem de áudio";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Delay before a sent user message is flipped to read. Purely local:
    /// the webhook never acknowledges delivery.
    pub read_receipt_delay: Duration,
    /// How long a reply must be outstanding before the typing indicator shows.
    pub typing_indicator_delay: Duration,
    /// Number of prior messages sent along as `history`.
    pub history_window: usize,
    pub max_recording_secs: u32,
    /// Assistant text used when the webhook reply carries no usable field.
    pub fallback_reply: String,
    /// Transcript text of a user voice message.
    pub audio_label: String,
    /// Append an assistant error bubble when a send fails. Off by default:
    /// failures are only logged and reported as events.
    pub surface_errors: bool,
    /// Assistant greetings played one by one when the chat unlocks.
    pub greetings: Vec<String>,
    pub greeting_typing_delay: Duration,
    pub greeting_gap: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            read_receipt_delay: Duration::from_millis(800),
            typing_indicator_delay: Duration::from_millis(2000),
            history_window: 20,
            max_recording_secs: DEFAULT_MAX_RECORDING_SECS,
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
            audio_label: DEFAULT_AUDIO_LABEL.to_string(),
            surface_errors: false,
            greetings: Vec::new(),
            greeting_typing_delay: Duration::from_millis(1000),
            greeting_gap: Duration::from_millis(500),
        }
    }
}
