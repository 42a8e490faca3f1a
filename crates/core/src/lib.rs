pub mod commands;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extractor;
pub mod form;
pub mod generic_types;
pub mod session_state;
pub mod silence;
pub mod song;
pub mod speech_queue;
pub mod voice_api;

#[cfg(test)]
mod testing;

use generic_types::SessionSnapshot;
use tokio::sync::oneshot;

/// Everything the runtime can feed into a
/// [`ConversationSession`](session_state::ConversationSession).
///
/// User actions, transcript progress from the [`TranscriptSource`](voice_api::TranscriptSource),
/// and queries all arrive through the same channel so the session handles them
/// strictly one at a time.
#[derive(Debug)]
pub enum Input {
    /// The user opted in; ask for the microphone and greet them.
    Start,
    /// The transcript grew. Carries the full text so far.
    TranscriptChanged(String),
    /// Tap-to-talk: start capture, finish the current utterance, or interrupt the agent.
    ToggleCapture,
    /// Halt playback and capture and go idle.
    Stop,
    /// Typed input, treated as a finished utterance.
    SubmitText(String),
    /// Throw away the current form and start again.
    NewSong,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}
