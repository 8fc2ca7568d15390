//! Exercises the HTTP webhook client against a stub running on an ephemeral port.

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use leadchat_core::SessionEvent;
use leadchat_core::clock::FixedClock;
use leadchat_core::config::ChatConfig;
use leadchat_core::lead::LeadInfo;
use leadchat_core::message::MessageRole;
use leadchat_core::recorder::AudioPayload;
use leadchat_core::runtime::ChatRuntime;
use leadchat_core::session::ChatSession;
use leadchat_core::webhook::{
    AudioMessage, AudioTransport, FailureKind, HttpWebhook, LeadRegistration, TextMessage,
    Webhook, WebhookError, WebhookRequest,
};
use leadchat_webhook_stub::{
    config::StubConfig,
    models::{ReceivedRequest, RequestKind, Transport},
    router::create_router,
    state::AppState,
};
use std::sync::Arc;
use tokio::net::TcpListener;

const TS: &str = "2026-10-18T09:30:00.000-03:00";

struct Stub {
    base_url: String,
    state: Arc<AppState>,
}

impl Stub {
    async fn start(fail_status: Option<StatusCode>) -> Self {
        let state = Arc::new(AppState::new(StubConfig {
            fail_status,
            ..StubConfig::default()
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    fn webhook(&self, transport: AudioTransport) -> HttpWebhook {
        HttpWebhook::new(format!("{}/webhook", self.base_url), transport)
    }

    async fn received(&self) -> Vec<ReceivedRequest> {
        self.state.received.lock().await.clone()
    }
}

fn ana() -> LeadInfo {
    LeadInfo {
        name: "Ana".to_string(),
        email: "a@b.com".to_string(),
        phone: "11999998888".to_string(),
        ..Default::default()
    }
}

fn text(message: &str) -> WebhookRequest {
    WebhookRequest::Text(TextMessage {
        message: message.to_string(),
        timestamp: TS.to_string(),
        history: vec![],
        lead: ana(),
    })
}

fn audio() -> WebhookRequest {
    WebhookRequest::Audio(AudioMessage {
        audio: AudioPayload {
            bytes: b"webm-bytes".to_vec(),
            duration_secs: 4,
        },
        timestamp: TS.to_string(),
        history: vec![],
        lead: ana(),
    })
}

#[tokio::test]
async fn test_text_message_gets_reply() {
    let stub = Stub::start(None).await;
    let reply = stub
        .webhook(AudioTransport::Multipart)
        .send(&text("oi"))
        .await
        .unwrap();

    assert_eq!(
        reply.text.as_deref(),
        Some("Olá, Ana! Recebemos sua mensagem: \"oi\"")
    );
    let received = stub.received().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, RequestKind::Text);
    assert_eq!(received[0].transport, Transport::Json);
    assert_eq!(received[0].message.as_deref(), Some("oi"));
    assert_eq!(received[0].timestamp, TS);
}

#[tokio::test]
async fn test_audio_as_multipart() {
    let stub = Stub::start(None).await;
    let reply = stub
        .webhook(AudioTransport::Multipart)
        .send(&audio())
        .await
        .unwrap();

    assert!(reply.text.unwrap().contains("10 bytes"));
    let received = stub.received().await;
    assert_eq!(received[0].kind, RequestKind::Audio);
    assert_eq!(received[0].transport, Transport::Multipart);
    assert_eq!(received[0].audio_bytes, Some(10));
    assert_eq!(received[0].audio_format.as_deref(), Some("webm"));
    assert_eq!(received[0].lead_email, "a@b.com");
}

#[tokio::test]
async fn test_audio_as_base64_json() {
    let stub = Stub::start(None).await;
    stub.webhook(AudioTransport::Base64Json)
        .send(&audio())
        .await
        .unwrap();

    let received = stub.received().await;
    assert_eq!(received[0].transport, Transport::Json);
    assert_eq!(received[0].audio_bytes, Some(10));
    assert_eq!(received[0].audio_duration_seconds, Some(4));
}

#[tokio::test]
async fn test_server_error_is_categorized() {
    let stub = Stub::start(Some(StatusCode::INTERNAL_SERVER_ERROR)).await;
    let err = stub
        .webhook(AudioTransport::Multipart)
        .send(&text("oi"))
        .await
        .unwrap_err();

    assert!(matches!(err, WebhookError::Status { status: 500, .. }));
    assert_eq!(err.kind(), FailureKind::ServerUnavailable);
    // the request still reached the stub
    assert_eq!(stub.received().await.len(), 1);
}

#[tokio::test]
async fn test_rate_limit_is_categorized() {
    let stub = Stub::start(Some(StatusCode::TOO_MANY_REQUESTS)).await;
    let err = stub
        .webhook(AudioTransport::Multipart)
        .send(&text("oi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::RateLimited);
}

#[tokio::test]
async fn test_lead_registration() {
    let stub = Stub::start(None).await;
    stub.webhook(AudioTransport::Multipart)
        .register_lead(&LeadRegistration {
            lead: ana(),
            timestamp: TS.to_string(),
        })
        .await
        .unwrap();

    let received: Vec<ReceivedRequest> = reqwest::get(format!("{}/requests", stub.base_url))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].kind, RequestKind::LeadRegistration);
    assert_eq!(received[0].lead_name, "Ana");
}

#[tokio::test]
async fn test_malformed_payload_is_rejected() {
    let stub = Stub::start(None).await;
    let response = reqwest::Client::new()
        .post(format!("{}/webhook", stub.base_url))
        .json(&serde_json::json!({"messageType": "video"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    assert!(stub.received().await.is_empty());
}

#[tokio::test]
async fn test_chat_session_against_stub() {
    let stub = Stub::start(None).await;
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap(),
    ));
    let session = ChatSession::new(ChatConfig::default()).with_clock(clock);
    let webhook = Arc::new(stub.webhook(AudioTransport::Multipart));
    let (handle, mut events, task) = ChatRuntime::spawn(session, webhook);

    handle.submit_lead(ana()).await.unwrap();
    let mut assistant = None;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::MessageAppended(m) if m.role == MessageRole::Assistant => {
                assistant = Some(m.content);
            }
            SessionEvent::FocusInput => break,
            _ => {}
        }
    }
    assert_eq!(
        assistant.as_deref(),
        Some("Olá, Ana! Recebemos sua mensagem: \"Olá! Meu nome é Ana.\"")
    );

    handle.shutdown().await.unwrap();
    task.await.unwrap();

    let received = stub.received().await;
    let text = received
        .iter()
        .find(|r| r.kind == RequestKind::Text)
        .expect("opening message reached the stub");
    assert_eq!(text.timestamp, TS);
    assert_eq!(text.history_len, 0);
}
