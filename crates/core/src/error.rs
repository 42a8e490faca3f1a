//! Error taxonomy for the conversational form controller.

use thiserror::Error;

/// Errors surfaced by the session and its collaborators.
///
/// Most internal steps return `anyhow::Result` and get wrapped with context at
/// the boundary; these variants are the ones callers are expected to match on.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("microphone permission was denied")]
    PermissionDenied,

    #[error("speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio playback failed: {0}")]
    Playback(String),

    #[error("transcript capture failed: {0}")]
    Capture(String),

    #[error("the conversation session has shut down")]
    Closed,

    #[error("unknown form field: {0}")]
    UnknownField(String),
}
