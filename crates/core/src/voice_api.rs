use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

/// Options passed to [`TranscriptSource::start_listening`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListenOptions {
    /// Keep capturing across pauses instead of stopping after one utterance.
    pub continuous: bool,
    pub language: String,
    pub interim_results: bool,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self {
            continuous: false,
            language: "en-US".to_string(),
            interim_results: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// A speech-to-text stream.
///
/// Implementations report transcript growth by posting
/// [`Input::TranscriptChanged`](crate::Input::TranscriptChanged) to the session;
/// the session reads the accumulated text back through [`transcript`](Self::transcript).
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    async fn start_listening(&self, options: &ListenOptions) -> Result<()>;
    async fn stop_listening(&self) -> Result<()>;
    fn transcript(&self) -> String;
    fn reset_transcript(&self);
    fn is_capturing(&self) -> bool;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` in the given voice, returning encoded audio.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Plays `audio` and resolves once it has finished.
    async fn play(&self, audio: Vec<u8>) -> Result<()>;
    /// Cuts off whatever is playing.
    async fn stop(&self);
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    async fn request_microphone(&self) -> Permission;
}
