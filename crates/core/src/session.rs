//! The chat session state machine.
//!
//! `ChatSession` is synchronous and performs no I/O. Operations update the
//! transcript, schedule timers, queue [`SessionEvent`]s for the rendering
//! surface and hand back [`Dispatch`]es that the caller must post to the
//! webhook, feeding each result back through [`ChatSession::complete`].
//! Time only moves through [`ChatSession::advance`].
//!
//! ```text
//! LeadGate --submit_lead(valid)--> Active --end_session(1..=5)--> Closed
//! ```

use crate::SessionEvent;
use crate::clock::{Clock, SystemClock};
use crate::config::ChatConfig;
use crate::lead::{LeadErrors, LeadInfo};
use crate::message::{DeliveryStatus, HistoryEntry, Message, MessageId, Transcript};
use crate::recorder::{
    AudioCapture, AudioPayload, AudioRecorder, DeviceError, NoMicrophone, RecorderError,
    RecordingState, RecordingTick,
};
use crate::scheduler::{Scheduler, TaskId};
use crate::webhook::{
    AudioMessage, LeadRegistration, TextMessage, WebhookError, WebhookReply, WebhookRequest,
};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("The chat is not active")]
    NotActive,
    #[error("A lead has already been submitted for this session")]
    NotInLeadGate,
    #[error(transparent)]
    InvalidLead(#[from] LeadErrors),
    #[error("Rating must be between {MIN_RATING} and {MAX_RATING}, got {0}")]
    InvalidRating(u8),
    #[error("A recording is already in progress")]
    RecordingInProgress,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Identifies an outstanding webhook request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchId(u64);

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A webhook request the caller must perform on the session's behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub id: DispatchId,
    /// The user message this request carries.
    pub message_id: MessageId,
    pub request: WebhookRequest,
}

/// Result of a successful [`ChatSession::submit_lead`].
#[derive(Debug, Clone, PartialEq)]
pub struct LeadAccepted {
    /// Best-effort notification; its outcome never affects the session.
    pub registration: LeadRegistration,
    /// The synthesized opening message, already in the transcript. `None`
    /// when greetings are configured: the opening is then sent after the last
    /// greeting and surfaces through [`ChatSession::take_timer_dispatches`].
    pub opening: Option<Dispatch>,
}

/// Rating and optional comment left when the lead ends the chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub rating: u8,
    pub comment: Option<String>,
}

/// Feedback being edited in the end-of-chat dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackDraft {
    pub rating: Option<u8>,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveState {
    pub lead: LeadInfo,
    /// Assistant turns still outstanding: webhook replies, plus one for the
    /// greeting sequence while it plays.
    pub pending: usize,
    /// Indicator raised because a reply is taking long.
    reply_typing: bool,
    /// Indicator raised by the greeting sequence.
    greeting_typing: bool,
    pub draft: FeedbackDraft,
}

impl ActiveState {
    fn new(lead: LeadInfo) -> Self {
        Self {
            lead,
            pending: 0,
            reply_typing: false,
            greeting_typing: false,
            draft: FeedbackDraft::default(),
        }
    }

    pub fn typing(&self) -> bool {
        self.reply_typing || self.greeting_typing
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    LeadGate,
    Active(ActiveState),
    Closed(Feedback),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    MarkRead(MessageId),
    /// Raised when this dispatch is still unanswered.
    ShowTyping(DispatchId),
    RecordingTick,
    GreetingTyping(usize),
    GreetingReveal(usize),
    /// Sends the opening message held back during the greetings.
    Opening,
}

pub struct ChatSession {
    config: ChatConfig,
    clock: Arc<dyn Clock>,
    state: SessionState,
    transcript: Transcript,
    scheduler: Scheduler<Timer>,
    recorder: AudioRecorder,
    recording_tick: Option<TaskId>,
    next_dispatch: u64,
    outstanding: HashMap<DispatchId, MessageId>,
    events: VecDeque<SessionEvent>,
    timer_dispatches: VecDeque<Dispatch>,
    deferred_opening: Option<String>,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("state", &self.state)
            .field("messages", &self.transcript.len())
            .field("recorder", &self.recorder)
            .field("outstanding", &self.outstanding.len())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Creates a session at the lead gate, using the system clock and no
    /// microphone.
    pub fn new(config: ChatConfig) -> Self {
        let recorder = AudioRecorder::new(Box::new(NoMicrophone), config.max_recording_secs);
        Self {
            config,
            clock: Arc::new(SystemClock),
            state: SessionState::LeadGate,
            transcript: Transcript::new(),
            scheduler: Scheduler::new(),
            recorder,
            recording_tick: None,
            next_dispatch: 0,
            outstanding: HashMap::new(),
            events: VecDeque::new(),
            timer_dispatches: VecDeque::new(),
            deferred_opening: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_capture(mut self, capture: Box<dyn AudioCapture>) -> Self {
        self.recorder = AudioRecorder::new(capture, self.config.max_recording_secs);
        self
    }

    // --- Accessors ---

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    pub fn lead(&self) -> Option<&LeadInfo> {
        match &self.state {
            SessionState::Active(active) => Some(&active.lead),
            _ => None,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Replies still outstanding. Zero outside the active state.
    pub fn pending(&self) -> usize {
        match &self.state {
            SessionState::Active(active) => active.pending,
            _ => 0,
        }
    }

    pub fn is_typing(&self) -> bool {
        match &self.state {
            SessionState::Active(active) => active.typing(),
            _ => false,
        }
    }

    pub fn recording_state(&self) -> RecordingState {
        self.recorder.state()
    }

    pub fn recording_elapsed_secs(&self) -> u32 {
        self.recorder.elapsed_secs()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Removes and returns every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Removes dispatches produced by timers (a recording that hit its
    /// maximum duration, the opening sent after the greetings) rather than by
    /// a direct call.
    pub fn take_timer_dispatches(&mut self) -> Vec<Dispatch> {
        self.timer_dispatches.drain(..).collect()
    }

    // --- Time ---

    /// Time until the next timer is due, if any is pending.
    pub fn next_timer_in(&mut self) -> Option<Duration> {
        self.scheduler.next_due_in()
    }

    /// Moves session time forward and fires every timer that became due.
    ///
    /// Time stops at each deadline on the way, so timers rescheduled by a
    /// handler (the recording tick) keep their cadence across a long step.
    pub fn advance(&mut self, by: Duration) {
        let target = self.scheduler.now() + by;
        while let Some(wait) = self.scheduler.next_due_in() {
            if self.scheduler.now() + wait > target {
                break;
            }
            self.scheduler.advance(wait);
            while let Some(timer) = self.scheduler.pop_due() {
                self.fire(timer);
            }
        }
        let rest = target.saturating_sub(self.scheduler.now());
        self.scheduler.advance(rest);
    }

    fn fire(&mut self, timer: Timer) {
        match timer {
            Timer::MarkRead(id) => {
                if self.transcript.mark_read(id) {
                    self.events.push_back(SessionEvent::StatusChanged {
                        id,
                        status: DeliveryStatus::Read,
                    });
                }
            }
            Timer::ShowTyping(dispatch) => {
                if !self.outstanding.contains_key(&dispatch) {
                    return;
                }
                if let SessionState::Active(active) = &mut self.state {
                    let was = active.typing();
                    active.reply_typing = true;
                    if !was {
                        self.events.push_back(SessionEvent::TypingChanged(true));
                    }
                }
            }
            Timer::RecordingTick => {
                self.recording_tick = None;
                match self.recorder.tick() {
                    RecordingTick::Ignored => {}
                    RecordingTick::Elapsed(secs) => {
                        self.events.push_back(SessionEvent::RecordingChanged {
                            state: RecordingState::Recording,
                            elapsed_secs: secs,
                        });
                        self.recording_tick = Some(
                            self.scheduler
                                .schedule(Duration::from_secs(1), Timer::RecordingTick),
                        );
                    }
                    RecordingTick::LimitReached(secs) => {
                        info!(secs, "Maximum recording duration reached, stopping");
                        self.events.push_back(SessionEvent::RecordingChanged {
                            state: RecordingState::Recording,
                            elapsed_secs: secs,
                        });
                        if let Ok(Some(dispatch)) = self.stop_recording() {
                            self.timer_dispatches.push_back(dispatch);
                        }
                    }
                }
            }
            Timer::GreetingTyping(index) => {
                if let SessionState::Active(active) = &mut self.state {
                    let was = active.typing();
                    active.greeting_typing = true;
                    if !was {
                        self.events.push_back(SessionEvent::TypingChanged(true));
                    }
                    self.scheduler.schedule(
                        self.config.greeting_typing_delay,
                        Timer::GreetingReveal(index),
                    );
                }
            }
            Timer::GreetingReveal(index) => {
                let Some(text) = self.config.greetings.get(index).cloned() else {
                    return;
                };
                if let SessionState::Active(active) = &mut self.state {
                    let was = active.typing();
                    active.greeting_typing = false;
                    if was && !active.typing() {
                        self.events.push_back(SessionEvent::TypingChanged(false));
                    }
                } else {
                    return;
                }
                let message = Message::assistant(text, self.clock.timestamp());
                self.append(message);
                if index + 1 < self.config.greetings.len() {
                    self.scheduler
                        .schedule(self.config.greeting_gap, Timer::GreetingTyping(index + 1));
                } else {
                    self.finish_turn();
                    self.scheduler
                        .schedule(self.config.greeting_gap, Timer::Opening);
                }
            }
            Timer::Opening => {
                if let Some(text) = self.deferred_opening.take() {
                    if self.is_active() {
                        let dispatch = self.enqueue_text(text);
                        self.timer_dispatches.push_back(dispatch);
                    }
                }
            }
        }
    }

    // --- Lead gate ---

    /// Validates the lead form and, on success, unlocks the chat.
    ///
    /// The returned registration should be posted without waiting for, or
    /// acting on, its outcome. The opening dispatch is a regular message; with
    /// greetings configured it follows them instead of going out at once.
    pub fn submit_lead(&mut self, info: LeadInfo) -> Result<LeadAccepted, SessionError> {
        if !matches!(self.state, SessionState::LeadGate) {
            return Err(SessionError::NotInLeadGate);
        }
        info.validate()?;

        let lead = info.normalized();
        let registration = LeadRegistration {
            lead: lead.clone(),
            timestamp: self.clock.timestamp(),
        };
        let opening_text = lead.opening_message();
        self.state = SessionState::Active(ActiveState::new(lead));
        info!(
            greetings = self.config.greetings.len(),
            "Lead accepted, chat unlocked"
        );
        self.events.push_back(SessionEvent::Activated);

        let opening = if self.config.greetings.is_empty() {
            Some(self.enqueue_text(opening_text))
        } else {
            if let SessionState::Active(active) = &mut self.state {
                active.pending += 1;
            }
            self.deferred_opening = Some(opening_text);
            self.scheduler
                .schedule(Duration::ZERO, Timer::GreetingTyping(0));
            None
        };
        Ok(LeadAccepted {
            registration,
            opening,
        })
    }

    // --- Message dispatch ---

    /// Echoes a user text message and returns the request to post.
    ///
    /// Blank input is ignored and yields `Ok(None)`.
    pub fn send_text(&mut self, content: &str) -> Result<Option<Dispatch>, SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.enqueue_text(content.to_string())))
    }

    fn enqueue_text(&mut self, content: String) -> Dispatch {
        let message = Message::user(content.clone(), self.clock.timestamp());
        self.enqueue(message, |history, lead, timestamp| {
            WebhookRequest::Text(TextMessage {
                message: content,
                timestamp,
                history,
                lead,
            })
        })
    }

    fn enqueue_audio(&mut self, payload: AudioPayload) -> Dispatch {
        let message = Message::user(self.config.audio_label.clone(), self.clock.timestamp())
            .with_audio(payload.attachment());
        self.enqueue(message, |history, lead, timestamp| {
            WebhookRequest::Audio(AudioMessage {
                audio: payload,
                timestamp,
                history,
                lead,
            })
        })
    }

    /// Appends a user message and arms the read-receipt and typing timers.
    /// Callers guarantee the session is active.
    fn enqueue(
        &mut self,
        message: Message,
        build: impl FnOnce(Vec<HistoryEntry>, LeadInfo, String) -> WebhookRequest,
    ) -> Dispatch {
        let history = self.transcript.history(self.config.history_window);
        let message_id = message.id;
        let timestamp = message.timestamp.clone();

        let lead = match &mut self.state {
            SessionState::Active(active) => {
                active.pending += 1;
                active.lead.clone()
            }
            _ => LeadInfo::default(),
        };

        let id = DispatchId(self.next_dispatch);
        self.next_dispatch += 1;
        self.outstanding.insert(id, message_id);

        self.append(message);
        self.scheduler
            .schedule(self.config.read_receipt_delay, Timer::MarkRead(message_id));
        self.scheduler
            .schedule(self.config.typing_indicator_delay, Timer::ShowTyping(id));
        debug!(dispatch = %id, pending = self.pending(), "Message queued for webhook");

        Dispatch {
            id,
            message_id,
            request: build(history, lead, timestamp),
        }
    }

    /// Feeds back the outcome of a dispatch.
    ///
    /// Runs for success and failure alike so the pending counter always
    /// returns to zero. Results for unknown dispatches, or arriving after the
    /// session closed, are dropped.
    pub fn complete(&mut self, id: DispatchId, result: Result<WebhookReply, WebhookError>) {
        let Some(message_id) = self.outstanding.remove(&id) else {
            debug!(dispatch = %id, "Dropping result for unknown dispatch");
            return;
        };
        if !self.is_active() {
            return;
        }

        match result {
            Ok(reply) => {
                let content = reply.content_or(&self.config.fallback_reply);
                let message = Message::assistant(content, self.clock.timestamp());
                self.append(message);
            }
            Err(e) => {
                let kind = e.kind();
                warn!(dispatch = %id, %kind, error = %e, "Failed to deliver message to webhook");
                self.events.push_back(SessionEvent::DeliveryFailed { message_id, kind });
                if self.config.surface_errors {
                    let message = Message::assistant(kind.user_message(), self.clock.timestamp());
                    self.append(message);
                }
            }
        }

        self.finish_turn();
    }

    /// Releases one pending slot. The last one clears the indicator and hands
    /// focus back to the input.
    fn finish_turn(&mut self) {
        if let SessionState::Active(active) = &mut self.state {
            active.pending = active.pending.saturating_sub(1);
            if active.pending == 0 {
                let was = active.typing();
                active.reply_typing = false;
                if was && !active.typing() {
                    self.events.push_back(SessionEvent::TypingChanged(false));
                }
                self.events.push_back(SessionEvent::FocusInput);
            }
        }
    }

    fn append(&mut self, message: Message) {
        self.transcript.push(message.clone());
        self.events.push_back(SessionEvent::MessageAppended(message));
    }

    // --- Audio ---

    /// Opens the microphone. Device failures are reported as an event and
    /// leave the recorder idle.
    pub fn start_recording(&mut self) -> Result<(), SessionError> {
        if !self.is_active() {
            return Err(SessionError::NotActive);
        }
        match self.recorder.start() {
            Ok(()) => {
                self.events.push_back(SessionEvent::RecordingChanged {
                    state: RecordingState::Recording,
                    elapsed_secs: 0,
                });
                self.recording_tick = Some(
                    self.scheduler
                        .schedule(Duration::from_secs(1), Timer::RecordingTick),
                );
                Ok(())
            }
            Err(RecorderError::Busy(_)) => Err(SessionError::RecordingInProgress),
            Err(RecorderError::Device(e)) => {
                self.events.push_back(SessionEvent::DeviceError(e.clone()));
                Err(e.into())
            }
        }
    }

    /// Finalizes the recording into a voice message and returns its request.
    ///
    /// Returns `Ok(None)` when nothing is being recorded.
    pub fn stop_recording(&mut self) -> Result<Option<Dispatch>, SessionError> {
        if self.recorder.state() != RecordingState::Recording {
            return Ok(None);
        }
        if let Some(task) = self.recording_tick.take() {
            self.scheduler.cancel(task);
        }
        self.events.push_back(SessionEvent::RecordingChanged {
            state: RecordingState::Processing,
            elapsed_secs: self.recorder.elapsed_secs(),
        });

        let result = self.recorder.stop();
        self.events.push_back(SessionEvent::RecordingChanged {
            state: RecordingState::Idle,
            elapsed_secs: 0,
        });
        match result {
            Ok(Some(payload)) => Ok(Some(self.enqueue_audio(payload))),
            Ok(None) => Ok(None),
            Err(e) => {
                self.events.push_back(SessionEvent::DeviceError(e.clone()));
                Err(e.into())
            }
        }
    }

    /// Discards the current recording, if any.
    pub fn cancel_recording(&mut self) {
        if self.recorder.state() != RecordingState::Recording {
            return;
        }
        if let Some(task) = self.recording_tick.take() {
            self.scheduler.cancel(task);
        }
        self.recorder.cancel();
        self.events.push_back(SessionEvent::RecordingChanged {
            state: RecordingState::Idle,
            elapsed_secs: 0,
        });
    }

    // --- Termination ---

    pub fn set_feedback_rating(&mut self, rating: u8) -> Result<(), SessionError> {
        validate_rating(rating)?;
        self.active_mut()?.draft.rating = Some(rating);
        Ok(())
    }

    pub fn set_feedback_comment(&mut self, comment: &str) -> Result<(), SessionError> {
        self.active_mut()?.draft.comment = comment.to_string();
        Ok(())
    }

    /// Abandons the end-of-chat dialog, resetting the draft.
    pub fn cancel_end_session(&mut self) {
        if let Ok(active) = self.active_mut() {
            active.draft = FeedbackDraft::default();
        }
    }

    /// Ends the chat with the feedback currently in the draft.
    pub fn confirm_end_session(&mut self) -> Result<Feedback, SessionError> {
        let draft = self.active_mut()?.draft.clone();
        self.end_session(draft.rating.unwrap_or(0), Some(draft.comment.as_str()))
    }

    /// Closes the session for good. Pending timers, outstanding replies and
    /// any active recording are discarded.
    pub fn end_session(
        &mut self,
        rating: u8,
        comment: Option<&str>,
    ) -> Result<Feedback, SessionError> {
        let was_typing = self.active_mut()?.typing();
        validate_rating(rating)?;

        self.cancel_recording();
        self.scheduler.clear();
        self.recording_tick = None;
        self.outstanding.clear();
        self.deferred_opening = None;

        let feedback = Feedback {
            rating,
            comment: comment
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
        };
        self.state = SessionState::Closed(feedback.clone());
        if was_typing {
            self.events.push_back(SessionEvent::TypingChanged(false));
        }
        info!(rating, messages = self.transcript.len(), "Chat session closed");
        self.events.push_back(SessionEvent::Closed(feedback.clone()));
        Ok(feedback)
    }

    fn active_mut(&mut self) -> Result<&mut ActiveState, SessionError> {
        match &mut self.state {
            SessionState::Active(active) => Ok(active),
            _ => Err(SessionError::NotActive),
        }
    }
}

fn validate_rating(rating: u8) -> Result<(), SessionError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(())
    } else {
        Err(SessionError::InvalidRating(rating))
    }
}
