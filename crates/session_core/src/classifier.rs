use serde_json::Value;
use shared::domain::MessageKind;
use shared::protocol::{EventFrame, StatusPayload};

/// Outcome of classifying one decoded frame: either a backend-authoritative
/// execution-state report (no transcript entry), or exactly one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Status { is_running: Option<bool> },
    Entry { kind: MessageKind, content: String },
}

/// Map one raw frame into a [`Classified`] value. Never fails: anything
/// that does not parse as a structured frame surfaces verbatim as a system
/// entry so malformed input cannot stall the channel.
pub fn classify_frame(raw: &str) -> Classified {
    let Ok(frame) = serde_json::from_str::<EventFrame>(raw) else {
        return Classified::Entry {
            kind: MessageKind::System,
            content: raw.to_string(),
        };
    };

    if frame.kind == "status" {
        // Side-effect only. A status frame whose payload does not carry the
        // running indicator is a no-op rather than an error.
        let is_running = serde_json::from_value::<StatusPayload>(frame.message)
            .ok()
            .map(|status| status.is_running);
        return Classified::Status { is_running };
    }

    let kind = match frame.kind.as_str() {
        "info" => MessageKind::System,
        "action" => MessageKind::Action,
        "error" => MessageKind::Error,
        // Fail-open: unknown event types still reach the operator.
        _ => MessageKind::System,
    };

    Classified::Entry {
        kind,
        content: display_text(frame.message),
    }
}

/// Stable display form of a frame payload: strings pass through untouched,
/// structured values serialize with serde_json's sorted map keys so the same
/// input always renders the same text.
fn display_text(message: Value) -> String {
    match message {
        Value::String(text) => text,
        other => other.to_string(),
    }
}
