use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use shared::domain::{MessageKind, Provider};
use shared::protocol::{ConfigureRequest, ErrorDetail, StatusResponse, TaskRequest};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod channel;
pub mod classifier;
pub mod error;
pub mod state;

pub use channel::{KEEPALIVE_INTERVAL, RECONNECT_DELAY};
pub use error::CommandError;
pub use state::{ConnectionPhase, SessionMessage, SessionState, StateChange};

/// Timeout for one-shot command requests. The wire protocol has no request
/// timeout of its own; without this a hung backend parks a command forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client-side session manager: owns the event channel to the backend, the
/// local [`SessionState`] aggregate, and the one-shot command surface
/// (configure, submit task, stop task, status poll).
///
/// State is mutated only through the entry points on this type, all of which
/// run on the tokio event loop; presentation reads snapshots and subscribes
/// to [`StateChange`] notifications.
pub struct SessionClient {
    http: Client,
    pub(crate) backend_url: String,
    inner: Mutex<SessionState>,
    events: broadcast::Sender<StateChange>,
    pub(crate) channel_task: Mutex<Option<JoinHandle<()>>>,
    pub(crate) reconnect_delay: Duration,
    pub(crate) keepalive_interval: Duration,
}

impl SessionClient {
    pub fn new(backend_url: impl Into<String>) -> Arc<Self> {
        Self::with_timing(backend_url, RECONNECT_DELAY, KEEPALIVE_INTERVAL)
    }

    /// Constructor with injectable channel timing so tests do not have to
    /// wait out the production reconnect and keepalive policies.
    pub fn with_timing(
        backend_url: impl Into<String>,
        reconnect_delay: Duration,
        keepalive_interval: Duration,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(1024);
        Arc::new(Self {
            http: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("failed to construct http client"),
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            inner: Mutex::new(SessionState::default()),
            events,
            channel_task: Mutex::new(None),
            reconnect_delay,
            keepalive_interval,
        })
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    pub async fn phase(&self) -> ConnectionPhase {
        self.inner.lock().await.phase()
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_running()
    }

    pub async fn is_configured(&self) -> bool {
        self.inner.lock().await.is_configured()
    }

    pub async fn configured_provider(&self) -> Option<Provider> {
        self.inner.lock().await.configured_provider()
    }

    pub async fn messages(&self) -> Vec<SessionMessage> {
        self.inner.lock().await.messages().to_vec()
    }

    /// Configure the backend provider and credential. Fails locally on a
    /// blank credential; the session only counts as configured once the
    /// backend acknowledges, never optimistically.
    pub async fn configure(&self, provider: Provider, api_key: &str) -> Result<(), CommandError> {
        if api_key.trim().is_empty() {
            self.push_message(MessageKind::Error, "API key is required")
                .await;
            return Err(CommandError::Validation(
                "api_key must not be blank".to_string(),
            ));
        }

        let result = self
            .http
            .post(format!("{}/api/config", self.backend_url))
            .json(&ConfigureRequest {
                provider,
                api_key: api_key.to_string(),
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(provider = %provider, "backend configuration accepted");
                self.mark_configured(provider, api_key.to_string()).await;
                self.push_message(
                    MessageKind::System,
                    format!("Configured {}", provider.as_str().to_uppercase()),
                )
                .await;
                Ok(())
            }
            Ok(response) => {
                let detail = rejection_detail(response).await;
                self.push_message(MessageKind::Error, format!("Configuration failed: {detail}"))
                    .await;
                Err(CommandError::Rejected { detail })
            }
            Err(err) => {
                warn!("configure request failed: {err}");
                self.push_message(MessageKind::Error, "Backend unreachable")
                    .await;
                Err(CommandError::Transport(err))
            }
        }
    }

    /// Submit one natural-language task. Blank input is a no-op; submitting
    /// while unconfigured fails fast without touching the network. The user
    /// entry is appended before the request goes out; the running flag only
    /// rises on backend acceptance.
    pub async fn submit_task(&self, text: &str) -> Result<(), CommandError> {
        let task = text.trim();
        if task.is_empty() {
            return Ok(());
        }

        if !self.is_configured().await {
            self.push_message(
                MessageKind::Error,
                "Configure an API key before submitting tasks",
            )
            .await;
            return Err(CommandError::NotConfigured);
        }

        self.push_message(MessageKind::User, task).await;

        let result = self
            .http
            .post(format!("{}/api/chat", self.backend_url))
            .json(&TaskRequest {
                message: task.to_string(),
            })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("task accepted by backend");
                self.set_running(true).await;
                Ok(())
            }
            Ok(response) => {
                let detail = rejection_detail(response).await;
                self.push_message(MessageKind::Error, format!("Send failed: {detail}"))
                    .await;
                Err(CommandError::Rejected { detail })
            }
            Err(err) => {
                warn!("task submission failed: {err}");
                self.push_message(MessageKind::Error, "Backend unreachable")
                    .await;
                Err(CommandError::Transport(err))
            }
        }
    }

    /// Emergency stop. Best-effort and idempotent: the request always goes
    /// out regardless of the local running flag, the response body is not
    /// interpreted, and the flag clears with a confirmation entry even on
    /// transport failure. A stuck running indicator is the worse failure
    /// mode; a later status frame corrects the flag if the stop never
    /// reached the backend.
    pub async fn stop_task(&self) {
        if let Err(err) = self
            .http
            .post(format!("{}/api/stop", self.backend_url))
            .send()
            .await
        {
            warn!("stop request failed: {err}");
        }
        self.set_running(false).await;
        self.push_message(MessageKind::System, "Stop signal sent")
            .await;
    }

    /// One-shot status poll. Advisory resync for presentation on startup or
    /// after a reconnect: the backend's reported running state overwrites
    /// the local flag. Failures leave state untouched and add no transcript
    /// noise.
    pub async fn fetch_status(&self) -> Result<StatusResponse, CommandError> {
        let response = self
            .http
            .get(format!("{}/api/status", self.backend_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let detail = rejection_detail(response).await;
            debug!(%detail, "status poll rejected");
            return Err(CommandError::Rejected { detail });
        }

        let status: StatusResponse = response.json().await?;
        self.set_running(status.is_running).await;
        Ok(status)
    }

    pub(crate) async fn set_phase(&self, phase: ConnectionPhase) {
        let changed = { self.inner.lock().await.set_phase(phase) };
        if changed {
            let _ = self.events.send(StateChange::Phase(phase));
        }
    }

    pub(crate) async fn set_running(&self, running: bool) {
        let changed = { self.inner.lock().await.set_running(running) };
        if changed {
            let _ = self.events.send(StateChange::Running(running));
        }
    }

    pub(crate) async fn push_message(&self, kind: MessageKind, content: impl Into<String>) {
        let message = { self.inner.lock().await.push_message(kind, content.into()) };
        let _ = self.events.send(StateChange::Message(message));
    }

    async fn mark_configured(&self, provider: Provider, api_key: String) {
        {
            self.inner.lock().await.set_config(provider, api_key);
        }
        let _ = self.events.send(StateChange::Configured(provider));
    }
}

/// Extract the backend-provided reason from a rejection response, falling
/// back to the HTTP status when the body carries no structured detail.
async fn rejection_detail(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorDetail>().await {
        Ok(body) => body.detail,
        Err(_) => format!("backend returned {status}"),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
