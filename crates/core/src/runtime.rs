//! Async driver for a [`ChatSession`].
//!
//! One task owns the session. Commands arrive through a [`ChatHandle`],
//! webhook calls run concurrently in a `JoinSet`, and the loop sleeps until
//! the session's next timer is due. Everything the session emits is forwarded
//! over an `mpsc` channel.

use crate::SessionEvent;
use crate::lead::LeadInfo;
use crate::session::{ChatSession, Dispatch, DispatchId, Feedback, SessionError};
use crate::webhook::{LeadRegistration, Webhook, WebhookError, WebhookReply};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("The chat runtime has stopped")]
    Stopped,
    #[error(transparent)]
    Session(#[from] SessionError),
}

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

#[derive(Debug)]
enum Request {
    SubmitLead(LeadInfo, Reply<()>),
    SendText(String, Reply<()>),
    StartRecording(Reply<()>),
    StopRecording(Reply<()>),
    CancelRecording,
    EndSession {
        rating: u8,
        comment: Option<String>,
        reply: Reply<Feedback>,
    },
    CancelEndSession,
    Shutdown,
}

/// Cheap, cloneable front end to a running session.
#[derive(Debug, Clone)]
pub struct ChatHandle {
    tx: mpsc::Sender<Request>,
}

impl ChatHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, RuntimeError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        let result = reply_rx.await.map_err(|_| RuntimeError::Stopped)?;
        Ok(result?)
    }

    async fn notify(&self, request: Request) -> Result<(), RuntimeError> {
        self.tx.send(request).await.map_err(|_| RuntimeError::Stopped)
    }

    /// Submits the lead form. Validation errors come back as
    /// [`SessionError::InvalidLead`].
    pub async fn submit_lead(&self, info: LeadInfo) -> Result<(), RuntimeError> {
        self.call(|reply| Request::SubmitLead(info, reply)).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), RuntimeError> {
        let text = text.into();
        self.call(|reply| Request::SendText(text, reply)).await
    }

    pub async fn start_recording(&self) -> Result<(), RuntimeError> {
        self.call(Request::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<(), RuntimeError> {
        self.call(Request::StopRecording).await
    }

    pub async fn cancel_recording(&self) -> Result<(), RuntimeError> {
        self.notify(Request::CancelRecording).await
    }

    pub async fn end_session(
        &self,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Feedback, RuntimeError> {
        self.call(|reply| Request::EndSession {
            rating,
            comment,
            reply,
        })
        .await
    }

    pub async fn cancel_end_session(&self) -> Result<(), RuntimeError> {
        self.notify(Request::CancelEndSession).await
    }

    /// Stops the runtime. Outstanding webhook calls are aborted.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.notify(Request::Shutdown).await
    }
}

pub struct ChatRuntime {
    session: ChatSession,
    webhook: Arc<dyn Webhook>,
    in_flight: JoinSet<Result<WebhookReply, WebhookError>>,
    dispatches: HashMap<task::Id, DispatchId>,
    events_tx: mpsc::Sender<SessionEvent>,
    last_tick: Instant,
}

enum Wake {
    Request(Option<Request>),
    Completed(Result<(task::Id, Result<WebhookReply, WebhookError>), task::JoinError>),
    Timer,
}

impl ChatRuntime {
    /// Starts driving `session` on a new task.
    ///
    /// The runtime stops when [`ChatHandle::shutdown`] is called or every
    /// handle has been dropped.
    pub fn spawn(
        session: ChatSession,
        webhook: Arc<dyn Webhook>,
    ) -> (ChatHandle, mpsc::Receiver<SessionEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::channel(128);
        let runtime = ChatRuntime {
            session,
            webhook,
            in_flight: JoinSet::new(),
            dispatches: HashMap::new(),
            events_tx,
            last_tick: Instant::now(),
        };
        let span = tracing::info_span!("chat_runtime");
        let task = tokio::spawn(runtime.run(rx).instrument(span));
        (ChatHandle { tx }, events_rx, task)
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>) {
        info!("Chat runtime started");
        loop {
            let deadline = self.session.next_timer_in().map(|wait| self.last_tick + wait);
            let wake = tokio::select! {
                request = requests.recv() => Wake::Request(request),
                Some(joined) = self.in_flight.join_next_with_id() => Wake::Completed(joined),
                _ = sleep_until(deadline.unwrap_or(self.last_tick)), if deadline.is_some() => Wake::Timer,
            };

            self.tick();
            match wake {
                Wake::Request(None) | Wake::Request(Some(Request::Shutdown)) => break,
                Wake::Request(Some(request)) => self.handle(request),
                Wake::Completed(joined) => self.on_completed(joined),
                Wake::Timer => {}
            }
            self.flush().await;
        }
        self.in_flight.abort_all();
        info!(
            messages = self.session.transcript().len(),
            "Chat runtime stopped"
        );
    }

    /// Advances the session to the current instant.
    fn tick(&mut self) {
        let now = Instant::now();
        self.session.advance(now.saturating_duration_since(self.last_tick));
        self.last_tick = now;
    }

    fn handle(&mut self, request: Request) {
        match request {
            Request::SubmitLead(info, reply) => {
                let result = self.session.submit_lead(info).map(|accepted| {
                    self.register_lead(accepted.registration);
                    if let Some(opening) = accepted.opening {
                        self.perform(opening);
                    }
                });
                let _ = reply.send(result);
            }
            Request::SendText(text, reply) => {
                let result = self.session.send_text(&text).map(|dispatch| {
                    if let Some(dispatch) = dispatch {
                        self.perform(dispatch);
                    }
                });
                let _ = reply.send(result);
            }
            Request::StartRecording(reply) => {
                let _ = reply.send(self.session.start_recording());
            }
            Request::StopRecording(reply) => {
                let result = self.session.stop_recording().map(|dispatch| {
                    if let Some(dispatch) = dispatch {
                        self.perform(dispatch);
                    }
                });
                let _ = reply.send(result);
            }
            Request::CancelRecording => self.session.cancel_recording(),
            Request::EndSession {
                rating,
                comment,
                reply,
            } => {
                let result = self.session.end_session(rating, comment.as_deref());
                if result.is_ok() {
                    self.in_flight.abort_all();
                    self.dispatches.clear();
                }
                let _ = reply.send(result);
            }
            Request::CancelEndSession => self.session.cancel_end_session(),
            Request::Shutdown => {}
        }
    }

    /// Spawns the webhook call for a dispatch.
    #[instrument(skip_all, fields(dispatch = %dispatch.id, kind = dispatch.request.kind()))]
    fn perform(&mut self, dispatch: Dispatch) {
        let webhook = self.webhook.clone();
        let request = dispatch.request;
        let abort = self
            .in_flight
            .spawn(async move { webhook.send(&request).await });
        self.dispatches.insert(abort.id(), dispatch.id);
        debug!(in_flight = self.in_flight.len(), "Webhook call started");
    }

    /// Fire-and-forget; the outcome never reaches the session.
    fn register_lead(&self, registration: LeadRegistration) {
        let webhook = self.webhook.clone();
        tokio::spawn(
            async move {
                match webhook.register_lead(&registration).await {
                    Ok(()) => debug!("Lead registered"),
                    Err(e) => warn!(error = %e, "Failed to register lead"),
                }
            }
            .in_current_span(),
        );
    }

    fn on_completed(
        &mut self,
        joined: Result<(task::Id, Result<WebhookReply, WebhookError>), task::JoinError>,
    ) {
        let (task_id, result) = match joined {
            Ok((task_id, result)) => (task_id, result),
            Err(e) if e.is_cancelled() => {
                self.dispatches.remove(&e.id());
                return;
            }
            Err(e) => {
                warn!(error = %e, "Webhook task failed");
                let task_id = e.id();
                (task_id, Err(WebhookError::Transport(e.to_string())))
            }
        };
        if let Some(dispatch) = self.dispatches.remove(&task_id) {
            self.session.complete(dispatch, result);
        }
    }

    /// Starts timer-produced dispatches and forwards pending events.
    async fn flush(&mut self) {
        for dispatch in self.session.take_timer_dispatches() {
            self.perform(dispatch);
        }
        for event in self.session.drain_events() {
            if self.events_tx.send(event).await.is_err() {
                debug!("Event receiver dropped");
            }
        }
    }
}
