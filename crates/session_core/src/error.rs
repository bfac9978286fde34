use thiserror::Error;

/// Failure taxonomy for the one-shot command surface. `Validation` and
/// `NotConfigured` are detected locally and never reach the network;
/// `Rejected` carries the backend's structured reason; `Transport` means no
/// usable response arrived at all. None of these are fatal: every failure
/// also lands in the transcript at the boundary that produced it.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("backend not configured; set a provider and API key first")]
    NotConfigured,
    #[error("backend rejected the request: {detail}")]
    Rejected { detail: String },
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}
