//! Plain-text rendering of session events.

use leadchat_core::SessionEvent;
use leadchat_core::message::{DeliveryStatus, Message, MessageRole};
use leadchat_core::recorder::{RecordingState, format_duration};

/// The line to print for `event`, if it has a visible effect.
///
/// Delivery failures render nothing: the transcript stays clean and the
/// failure is already logged.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    match event {
        SessionEvent::Activated => Some(format!("Chat iniciado. {}", crate::input::HELP)),
        SessionEvent::MessageAppended(message) => Some(render_message(message)),
        SessionEvent::StatusChanged {
            status: DeliveryStatus::Read,
            ..
        } => Some("        ✓✓ lida".to_string()),
        SessionEvent::StatusChanged { .. } => None,
        SessionEvent::TypingChanged(true) => Some("Assistente está digitando...".to_string()),
        SessionEvent::TypingChanged(false) => None,
        SessionEvent::RecordingChanged {
            state: RecordingState::Recording,
            elapsed_secs,
        } => Some(format!("● Gravando {}", format_duration(*elapsed_secs))),
        SessionEvent::RecordingChanged {
            state: RecordingState::Processing,
            ..
        } => Some("Processando áudio...".to_string()),
        SessionEvent::RecordingChanged {
            state: RecordingState::Idle,
            ..
        } => None,
        SessionEvent::DeviceError(e) => Some(format!("⚠ {}", e.user_message())),
        SessionEvent::DeliveryFailed { .. } | SessionEvent::FocusInput => None,
        SessionEvent::Closed(feedback) => Some(format!(
            "Obrigado pela avaliação ({}/5)! Conversa encerrada.",
            feedback.rating
        )),
    }
}

pub fn render_message(message: &Message) -> String {
    // "2026-10-18T09:30:00.000-03:00" -> "09:30"
    let time = message.timestamp.get(11..16).unwrap_or("--:--");
    let who = match message.role {
        MessageRole::User => "Você",
        MessageRole::Assistant => "Assistente",
    };
    match &message.audio {
        Some(audio) => format!(
            "[{time}] {who}: {} ({})",
            message.content,
            format_duration(audio.duration_secs)
        ),
        None => format!("[{time}] {who}: {}", message.content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadchat_core::message::{AudioAttachment, MessageId};
    use leadchat_core::recorder::DeviceError;
    use leadchat_core::session::Feedback;
    use leadchat_core::webhook::FailureKind;

    const TS: &str = "2026-10-18T09:30:00.000-03:00";

    #[test]
    fn test_render_messages() {
        assert_eq!(
            render_message(&Message::user("oi", TS.to_string())),
            "[09:30] Você: oi"
        );
        assert_eq!(
            render_message(&Message::assistant("olá", TS.to_string())),
            "[09:30] Assistente: olá"
        );
        let audio = Message::user("🎤 Mensagem de áudio", TS.to_string()).with_audio(
            AudioAttachment {
                payload: String::new(),
                duration_secs: 65,
            },
        );
        assert_eq!(
            render_message(&audio),
            "[09:30] Você: 🎤 Mensagem de áudio (01:05)"
        );
    }

    #[test]
    fn test_silent_events() {
        for event in [
            SessionEvent::FocusInput,
            SessionEvent::TypingChanged(false),
            SessionEvent::DeliveryFailed {
                message_id: MessageId::new(),
                kind: FailureKind::ServerUnavailable,
            },
            SessionEvent::StatusChanged {
                id: MessageId::new(),
                status: DeliveryStatus::Sent,
            },
        ] {
            assert_eq!(render_event(&event), None, "{event:?}");
        }
    }

    #[test]
    fn test_visible_events() {
        assert_eq!(
            render_event(&SessionEvent::RecordingChanged {
                state: RecordingState::Recording,
                elapsed_secs: 7,
            })
            .as_deref(),
            Some("● Gravando 00:07")
        );
        assert_eq!(
            render_event(&SessionEvent::DeviceError(DeviceError::NotFound)),
            Some(format!("⚠ {}", DeviceError::NotFound.user_message()))
        );
        assert!(
            render_event(&SessionEvent::Closed(Feedback {
                rating: 4,
                comment: None,
            }))
            .unwrap()
            .contains("4/5")
        );
    }
}
