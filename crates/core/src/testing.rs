//! Fakes for the voice collaborators, shared by the unit tests.

use crate::Input;
use crate::voice_api::{
    AudioSink, ListenOptions, Permission, PermissionGate, SpeechSynthesizer, TranscriptSource,
};
use anyhow::{Result, bail};
use async_trait::async_trait;
use mockall::mock;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};

mock! {
    pub Gate {}
    #[async_trait]
    impl PermissionGate for Gate {
        async fn request_microphone(&self) -> Permission;
    }
}

pub fn gate(permission: Permission) -> MockGate {
    let mut gate = MockGate::new();
    gate.expect_request_microphone()
        .returning(move || permission);
    gate
}

/// Encodes the text itself as the "audio", so sinks can report what they played.
#[derive(Default)]
pub struct EchoSynthesizer {
    requests: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl EchoSynthesizer {
    /// Fails for any request whose text contains `needle`.
    pub fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for EchoSynthesizer {
    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(text.to_string());
        if let Some(needle) = &self.fail_on {
            if text.contains(needle.as_str()) {
                bail!("voice backend unavailable");
            }
        }
        Ok(text.as_bytes().to_vec())
    }
}

#[derive(Default)]
pub struct RecordingSink {
    played: Mutex<Vec<String>>,
    stops: AtomicUsize,
    hold: AtomicBool,
    release: Notify,
}

impl RecordingSink {
    /// Every `play` blocks until [`release`](Self::release) is called.
    pub fn holding() -> Self {
        let sink = Self::default();
        sink.hold.store(true, Ordering::SeqCst);
        sink
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let text = String::from_utf8(audio)?;
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        self.played.lock().unwrap().push(text);
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A transcript source driven by the test: `say` grows the transcript and
/// notifies the session the way a recogniser would.
pub struct FakeTranscript {
    text: Mutex<String>,
    capturing: AtomicBool,
    starts: Mutex<Vec<ListenOptions>>,
    stops: AtomicUsize,
    fail_start: AtomicBool,
    input_tx: Mutex<Option<mpsc::Sender<Input>>>,
}

impl Default for FakeTranscript {
    fn default() -> Self {
        Self {
            text: Mutex::new(String::new()),
            capturing: AtomicBool::new(false),
            starts: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            input_tx: Mutex::new(None),
        }
    }
}

impl FakeTranscript {
    pub fn connect(&self, input_tx: mpsc::Sender<Input>) {
        *self.input_tx.lock().unwrap() = Some(input_tx);
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    /// Appends `words` to the transcript, even when not capturing.
    pub async fn say(&self, words: &str) {
        let text = {
            let mut text = self.text.lock().unwrap();
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(words);
            text.clone()
        };
        let tx = self.input_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(Input::TranscriptChanged(text)).await;
        }
    }

    pub fn starts(&self) -> Vec<ListenOptions> {
        self.starts.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranscriptSource for FakeTranscript {
    async fn start_listening(&self, options: &ListenOptions) -> Result<()> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            bail!("recogniser busy");
        }
        self.starts.lock().unwrap().push(options.clone());
        self.capturing.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn transcript(&self) -> String {
        self.text.lock().unwrap().clone()
    }

    fn reset_transcript(&self) {
        self.text.lock().unwrap().clear();
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}
