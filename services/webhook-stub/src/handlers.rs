//! Axum Handlers for the Webhook Stub
//!
//! `POST /webhook` accepts the three payload shapes a chat session sends. JSON
//! bodies are told apart by their discriminator field, multipart bodies are
//! always voice messages.

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use leadchat_core::lead::LeadInfo;
use leadchat_core::message::HistoryEntry;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    models::{
        ErrorResponse, InboundMessage, InboundRegistration, ReceivedRequest, ReplyBody,
        RequestKind, Transport,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    /// Failure injected through `STUB_FAIL_STATUS`.
    Forced(StatusCode),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Forced(status) => {
                let message = format!("Forced failure with status {}", status.as_u16());
                (status, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

fn bad_request(err: impl fmt::Display) -> ApiError {
    ApiError::BadRequest(err.to_string())
}

/// Receive a chat message or lead registration.
#[utoipa::path(
    post,
    path = "/webhook",
    responses(
        (status = 200, description = "Message accepted, assistant reply returned", body = ReplyBody),
        (status = 204, description = "Lead registration accepted"),
        (status = 400, description = "Malformed payload", body = ErrorResponse),
        (status = 500, description = "Forced failure (any error status can be forced)", body = ErrorResponse)
    )
)]
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    request: Request,
) -> Result<Response, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    let received = if is_multipart {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        parse_multipart(multipart).await?
    } else {
        let Json(value) = Json::<Value>::from_request(request, &state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        parse_json(value)?
    };

    info!(
        kind = %received.kind,
        transport = ?received.transport,
        lead = %received.lead_name,
        history = received.history_len,
        "Webhook request received"
    );
    let reply = received.reply_text();
    let kind = received.kind;
    state.received.lock().await.push(received);

    if let Some(status) = state.config.fail_status {
        warn!(status = status.as_u16(), "Answering with forced failure");
        return Err(ApiError::Forced(status));
    }

    match kind {
        RequestKind::LeadRegistration => Ok(StatusCode::NO_CONTENT.into_response()),
        RequestKind::Text | RequestKind::Audio => Ok(Json(ReplyBody { text: reply }).into_response()),
    }
}

/// List every request received so far.
#[utoipa::path(
    get,
    path = "/requests",
    responses(
        (status = 200, description = "Received requests, oldest first", body = [ReceivedRequest])
    )
)]
pub async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<ReceivedRequest>> {
    Json(state.received.lock().await.clone())
}

fn parse_json(value: Value) -> Result<ReceivedRequest, ApiError> {
    if value.get("type").and_then(Value::as_str) == Some("lead_registration") {
        let registration: InboundRegistration =
            serde_json::from_value(value).map_err(bad_request)?;
        return Ok(ReceivedRequest::new(
            RequestKind::LeadRegistration,
            Transport::Json,
            &registration.lead,
            registration.timestamp,
        ));
    }

    match serde_json::from_value::<InboundMessage>(value).map_err(bad_request)? {
        InboundMessage::Text {
            message,
            timestamp,
            history,
            lead,
        } => {
            let mut received =
                ReceivedRequest::new(RequestKind::Text, Transport::Json, &lead, timestamp);
            received.message = Some(message);
            received.history_len = history.len();
            Ok(received)
        }
        InboundMessage::Audio {
            audio,
            format,
            duration,
            timestamp,
            history,
            lead,
        } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(audio.as_bytes())
                .map_err(bad_request)?;
            let mut received =
                ReceivedRequest::new(RequestKind::Audio, Transport::Json, &lead, timestamp);
            received.audio_bytes = Some(bytes.len());
            received.audio_format = Some(format);
            received.audio_duration_seconds = Some(duration);
            received.history_len = history.len();
            Ok(received)
        }
    }
}

async fn parse_multipart(mut multipart: Multipart) -> Result<ReceivedRequest, ApiError> {
    let mut audio_bytes = None;
    let mut fields = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "audio" {
            audio_bytes = Some(field.bytes().await.map_err(bad_request)?.len());
        } else {
            fields.insert(name, field.text().await.map_err(bad_request)?);
        }
    }

    let field = |name: &str| {
        fields
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::BadRequest(format!("missing multipart field `{name}`")))
    };
    let message_type = field("messageType")?;
    if message_type != "audio" {
        return Err(ApiError::BadRequest(format!(
            "unsupported multipart messageType `{message_type}`"
        )));
    }
    let audio_bytes =
        audio_bytes.ok_or_else(|| ApiError::BadRequest("missing audio part".to_string()))?;
    let lead: LeadInfo = serde_json::from_str(&field("lead")?).map_err(bad_request)?;
    let history: Vec<HistoryEntry> =
        serde_json::from_str(&field("history")?).map_err(bad_request)?;

    let mut received =
        ReceivedRequest::new(RequestKind::Audio, Transport::Multipart, &lead, field("timestamp")?);
    received.audio_bytes = Some(audio_bytes);
    received.audio_format = Some(field("format")?);
    received.history_len = history.len();
    Ok(received)
}
