pub mod clock;
pub mod config;
pub mod lead;
pub mod message;
pub mod recorder;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod webhook;

use message::{DeliveryStatus, Message, MessageId};
use recorder::{DeviceError, RecordingState};
use session::Feedback;
use webhook::FailureKind;

/// Represents notifications that the session issues to a rendering surface.
///
/// This enum is the primary API for decoupling the chat flow from whatever
/// displays it (a terminal, a test, a widget). Events are emitted in the
/// order the state changes happened.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The lead gate opened and the chat is usable.
    Activated,
    /// A message was added to the end of the transcript.
    MessageAppended(Message),
    /// A user message's simulated delivery status moved forward.
    StatusChanged {
        id: MessageId,
        status: DeliveryStatus,
    },
    /// The typing indicator appeared (`true`) or disappeared (`false`).
    TypingChanged(bool),
    RecordingChanged {
        state: RecordingState,
        elapsed_secs: u32,
    },
    /// The microphone could not be used. Shown as a transient notification.
    DeviceError(DeviceError),
    /// A webhook request failed. Nothing is added to the transcript for it
    /// unless errors are surfaced.
    DeliveryFailed {
        message_id: MessageId,
        kind: FailureKind,
    },
    /// Every outstanding reply has resolved; the input can take focus again.
    FocusInput,
    /// The lead ended the chat.
    Closed(Feedback),
}
