use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Provider;

/// Liveness probe sent over the event channel while connected. Opaque to
/// the backend; it must never be interpreted as a task command.
pub const KEEPALIVE_PROBE: &str = "ping";

/// One inbound frame on the event channel. `message` is either plain text
/// or a structured payload depending on `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: Value,
}

/// Payload carried inside `status` frames. The backend's view of whether a
/// task is executing; authoritative over locally optimistic state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusPayload {
    pub is_running: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub provider: Provider,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    pub message: String,
}

/// Structured failure reason returned by the backend on rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Response of the one-shot status poll endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub is_running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}
