use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use shared::domain::{MessageKind, Provider};
use shared::protocol::{ConfigureRequest, StatusResponse, TaskRequest};
use tokio::net::TcpListener;

use crate::{CommandError, SessionClient, SessionMessage, StateChange};

/// URL no backend listens on; requests fail fast with a transport error.
const DEAD_BACKEND: &str = "http://127.0.0.1:9";

#[derive(Default)]
struct Hits {
    config: AtomicUsize,
    chat: AtomicUsize,
    stop: AtomicUsize,
}

#[derive(Clone)]
struct BackendFixture {
    reject_config: Option<String>,
    reject_chat: Option<String>,
    status_running: bool,
    hits: Arc<Hits>,
}

impl BackendFixture {
    fn accepting() -> Self {
        Self {
            reject_config: None,
            reject_chat: None,
            status_running: false,
            hits: Arc::new(Hits::default()),
        }
    }

    fn rejecting_config(detail: &str) -> Self {
        Self {
            reject_config: Some(detail.to_string()),
            ..Self::accepting()
        }
    }

    fn rejecting_chat(detail: &str) -> Self {
        Self {
            reject_chat: Some(detail.to_string()),
            ..Self::accepting()
        }
    }

    fn with_status_running(mut self, running: bool) -> Self {
        self.status_running = running;
        self
    }
}

async fn handle_config(
    State(fixture): State<BackendFixture>,
    Json(_request): Json<ConfigureRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    fixture.hits.config.fetch_add(1, Ordering::SeqCst);
    match &fixture.reject_config {
        Some(detail) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": detail })),
        ),
        None => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
    }
}

async fn handle_chat(
    State(fixture): State<BackendFixture>,
    Json(_request): Json<TaskRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    fixture.hits.chat.fetch_add(1, Ordering::SeqCst);
    match &fixture.reject_chat {
        Some(detail) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "detail": detail })),
        ),
        None => (StatusCode::OK, Json(serde_json::json!({ "success": true }))),
    }
}

async fn handle_stop(State(fixture): State<BackendFixture>) -> StatusCode {
    fixture.hits.stop.fetch_add(1, Ordering::SeqCst);
    StatusCode::OK
}

async fn handle_status(State(fixture): State<BackendFixture>) -> Json<StatusResponse> {
    Json(StatusResponse {
        is_running: fixture.status_running,
        current_task: fixture.status_running.then(|| "open calculator".to_string()),
    })
}

async fn spawn_backend(fixture: BackendFixture) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/config", post(handle_config))
        .route("/api/chat", post(handle_chat))
        .route("/api/stop", post(handle_stop))
        .route("/api/status", get(handle_status))
        .with_state(fixture);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn contents(messages: &[SessionMessage]) -> Vec<(MessageKind, &str)> {
    messages
        .iter()
        .map(|message| (message.kind, message.content.as_str()))
        .collect()
}

#[tokio::test]
async fn configure_with_blank_key_fails_locally_without_a_request() {
    let fixture = BackendFixture::accepting();
    let hits = Arc::clone(&fixture.hits);
    let client = SessionClient::new(spawn_backend(fixture).await);

    let err = client
        .configure(Provider::Openai, "   ")
        .await
        .expect_err("blank key must fail");
    assert!(matches!(err, CommandError::Validation(_)));
    assert_eq!(hits.config.load(Ordering::SeqCst), 0);
    assert!(!client.is_configured().await);

    let messages = client.messages().await;
    assert_eq!(
        contents(&messages),
        [(MessageKind::Error, "API key is required")]
    );
}

#[tokio::test]
async fn configure_success_marks_configured_and_names_the_provider() {
    let client = SessionClient::new(spawn_backend(BackendFixture::accepting()).await);

    client
        .configure(Provider::Gemini, "AIza-test")
        .await
        .expect("configure");

    assert!(client.is_configured().await);
    assert_eq!(client.configured_provider().await, Some(Provider::Gemini));

    let messages = client.messages().await;
    assert_eq!(
        contents(&messages),
        [(MessageKind::System, "Configured GEMINI")]
    );
}

#[tokio::test]
async fn configure_rejection_surfaces_the_backend_reason() {
    let client =
        SessionClient::new(spawn_backend(BackendFixture::rejecting_config("bad key")).await);

    let err = client
        .configure(Provider::Openai, "sk-nope")
        .await
        .expect_err("must be rejected");
    assert!(matches!(err, CommandError::Rejected { ref detail } if detail == "bad key"));
    assert!(!client.is_configured().await);

    let messages = client.messages().await;
    assert_eq!(
        contents(&messages),
        [(MessageKind::Error, "Configuration failed: bad key")]
    );
}

#[tokio::test]
async fn configure_transport_failure_leaves_state_unchanged() {
    let client = SessionClient::new(DEAD_BACKEND);

    let err = client
        .configure(Provider::Anthropic, "sk-ant")
        .await
        .expect_err("no backend listening");
    assert!(matches!(err, CommandError::Transport(_)));
    assert!(!client.is_configured().await);

    let messages = client.messages().await;
    assert_eq!(
        contents(&messages),
        [(MessageKind::Error, "Backend unreachable")]
    );
}

#[tokio::test]
async fn blank_task_submissions_are_noops() {
    let fixture = BackendFixture::accepting();
    let hits = Arc::clone(&fixture.hits);
    let client = SessionClient::new(spawn_backend(fixture).await);

    client.submit_task("").await.expect("empty is a no-op");
    client.submit_task("   ").await.expect("blank is a no-op");

    assert!(client.messages().await.is_empty());
    assert_eq!(hits.chat.load(Ordering::SeqCst), 0);
    assert!(!client.is_running().await);
}

#[tokio::test]
async fn task_submission_requires_configuration() {
    let fixture = BackendFixture::accepting();
    let hits = Arc::clone(&fixture.hits);
    let client = SessionClient::new(spawn_backend(fixture).await);

    let err = client
        .submit_task("open calculator")
        .await
        .expect_err("unconfigured must fail fast");
    assert!(matches!(err, CommandError::NotConfigured));
    assert_eq!(hits.chat.load(Ordering::SeqCst), 0);
    assert!(!client.is_running().await);

    let messages = client.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::Error);
}

#[tokio::test]
async fn accepted_task_logs_the_user_entry_then_raises_the_running_flag() {
    let client = SessionClient::new(spawn_backend(BackendFixture::accepting()).await);
    client
        .configure(Provider::Openai, "sk-test")
        .await
        .expect("configure");

    let mut rx = client.subscribe();
    client
        .submit_task("open calculator")
        .await
        .expect("submit");

    // The user entry goes out before the request; the flag rises only on
    // backend acceptance.
    match rx.recv().await.expect("first change") {
        StateChange::Message(message) => {
            assert_eq!(message.kind, MessageKind::User);
            assert_eq!(message.content, "open calculator");
        }
        other => panic!("unexpected change: {other:?}"),
    }
    match rx.recv().await.expect("second change") {
        StateChange::Running(running) => assert!(running),
        other => panic!("unexpected change: {other:?}"),
    }
    assert!(client.is_running().await);
}

#[tokio::test]
async fn rejected_task_keeps_the_running_flag_down() {
    let client =
        SessionClient::new(spawn_backend(BackendFixture::rejecting_chat("agent busy")).await);
    client
        .configure(Provider::Openai, "sk-test")
        .await
        .expect("configure");

    let err = client
        .submit_task("open calculator")
        .await
        .expect_err("must be rejected");
    assert!(matches!(err, CommandError::Rejected { ref detail } if detail == "agent busy"));
    assert!(!client.is_running().await);

    let messages = client.messages().await;
    let tail: Vec<(MessageKind, &str)> = contents(&messages)[1..].to_vec();
    assert_eq!(
        tail,
        [
            (MessageKind::User, "open calculator"),
            (MessageKind::Error, "Send failed: agent busy"),
        ]
    );
}

#[tokio::test]
async fn stop_clears_the_running_flag_and_confirms() {
    let fixture = BackendFixture::accepting();
    let hits = Arc::clone(&fixture.hits);
    let client = SessionClient::new(spawn_backend(fixture).await);
    client
        .configure(Provider::Openai, "sk-test")
        .await
        .expect("configure");
    client
        .submit_task("open calculator")
        .await
        .expect("submit");
    assert!(client.is_running().await);

    client.stop_task().await;

    assert!(!client.is_running().await);
    assert_eq!(hits.stop.load(Ordering::SeqCst), 1);
    let messages = client.messages().await;
    let last = messages.last().expect("confirmation entry");
    assert_eq!(last.kind, MessageKind::System);
    assert_eq!(last.content, "Stop signal sent");
}

#[tokio::test]
async fn stop_clears_the_running_flag_even_on_transport_failure() {
    let client = SessionClient::new(DEAD_BACKEND);
    client.set_running(true).await;

    client.stop_task().await;

    assert!(!client.is_running().await);
    let messages = client.messages().await;
    assert_eq!(
        contents(&messages),
        [(MessageKind::System, "Stop signal sent")]
    );
}

#[tokio::test]
async fn status_poll_adopts_the_backend_view_of_running() {
    let client = SessionClient::new(
        spawn_backend(BackendFixture::accepting().with_status_running(true)).await,
    );

    let status = client.fetch_status().await.expect("status");
    assert!(status.is_running);
    assert_eq!(status.current_task.as_deref(), Some("open calculator"));
    assert!(client.is_running().await);
}

#[tokio::test]
async fn status_poll_clears_a_stale_running_flag() {
    let client = SessionClient::new(
        spawn_backend(BackendFixture::accepting().with_status_running(false)).await,
    );
    client.set_running(true).await;

    let status = client.fetch_status().await.expect("status");
    assert!(!status.is_running);
    assert!(!client.is_running().await);
}

#[tokio::test]
async fn status_poll_failure_leaves_the_flag_untouched() {
    let client = SessionClient::new(DEAD_BACKEND);
    client.set_running(true).await;

    let err = client.fetch_status().await.expect_err("no backend");
    assert!(matches!(err, CommandError::Transport(_)));
    assert!(client.is_running().await);
    assert!(client.messages().await.is_empty());
}
