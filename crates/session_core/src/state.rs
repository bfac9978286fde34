use std::fmt;

use chrono::{DateTime, Utc};
use shared::domain::{MessageKind, Provider};
use uuid::Uuid;

/// Connectivity of the event channel. Driven only by channel lifecycle
/// events, never set directly by commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Connected => "connected",
        })
    }
}

/// One entry in the running transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMessage {
    pub id: String,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionMessage {
    pub(crate) fn new(kind: MessageKind, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            content,
            timestamp: Utc::now(),
        }
    }
}

/// Change notification delivered to presentation subscribers.
#[derive(Debug, Clone)]
pub enum StateChange {
    Phase(ConnectionPhase),
    Running(bool),
    Configured(Provider),
    Message(SessionMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConfigState {
    provider: Provider,
    api_key: String,
}

/// The local session model: connectivity phase, config status, running
/// flag and the append-only message log. One logical writer (the owning
/// client's mutation entry points); no entry point performs I/O.
#[derive(Debug)]
pub struct SessionState {
    phase: ConnectionPhase,
    running: bool,
    config: Option<ConfigState>,
    messages: Vec<SessionMessage>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            running: false,
            config: None,
            messages: Vec::new(),
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn configured_provider(&self) -> Option<Provider> {
        self.config.as_ref().map(|config| config.provider)
    }

    /// Credential entered for the current session. In-memory only; callers
    /// that persist it do so on their own account.
    pub fn api_key(&self) -> Option<&str> {
        self.config.as_ref().map(|config| config.api_key.as_str())
    }

    pub fn messages(&self) -> &[SessionMessage] {
        &self.messages
    }

    pub(crate) fn set_phase(&mut self, phase: ConnectionPhase) -> bool {
        if self.phase == phase {
            return false;
        }
        self.phase = phase;
        true
    }

    pub(crate) fn set_running(&mut self, running: bool) -> bool {
        if self.running == running {
            return false;
        }
        self.running = running;
        true
    }

    pub(crate) fn set_config(&mut self, provider: Provider, api_key: String) {
        self.config = Some(ConfigState { provider, api_key });
    }

    /// Append one entry. The log is never reordered or mutated afterwards.
    pub(crate) fn push_message(&mut self, kind: MessageKind, content: String) -> SessionMessage {
        let message = SessionMessage::new(kind, content);
        self.messages.push(message.clone());
        message
    }
}
