//! Terminal front end: stdin stands in for the speech recogniser and stdout
//! shows the conversation.

use anyhow::Result;
use async_trait::async_trait;
use std::io::BufRead;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc};
use tunegram_core::Input;
use tunegram_core::conversation::Speaker;
use tunegram_core::generic_types::SessionEvent;
use tunegram_core::session_state::SessionHandle;
use tunegram_core::voice_api::{AudioSink, ListenOptions, SpeechSynthesizer, TranscriptSource};

pub const USAGE: &str = "Commands: /start, /talk (toggle the microphone), /stop, /new, /state, /quit.\n\
While the microphone is on, every line you type is heard as speech; otherwise it is sent as typed input.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    Start,
    Talk,
    Stop,
    NewSong,
    State,
    Quit,
    Text(String),
    Empty,
}

pub fn parse_line(line: &str) -> ConsoleLine {
    let trimmed = line.trim();
    match trimmed.to_lowercase().as_str() {
        "" => ConsoleLine::Empty,
        "/start" => ConsoleLine::Start,
        "/talk" => ConsoleLine::Talk,
        "/stop" => ConsoleLine::Stop,
        "/new" => ConsoleLine::NewSong,
        "/state" => ConsoleLine::State,
        "/quit" | "/exit" => ConsoleLine::Quit,
        _ => ConsoleLine::Text(trimmed.to_string()),
    }
}

/// A transcript source fed from the terminal.
#[derive(Default)]
pub struct ConsoleTranscript {
    text: Mutex<String>,
    capturing: AtomicBool,
}

impl ConsoleTranscript {
    /// Appends a heard line and returns the whole transcript so far.
    pub fn append(&self, line: &str) -> String {
        let mut text = self.text.lock().unwrap_or_else(|e| e.into_inner());
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(line);
        text.clone()
    }
}

#[async_trait]
impl TranscriptSource for ConsoleTranscript {
    async fn start_listening(&self, options: &ListenOptions) -> Result<()> {
        tracing::debug!("Listening with {:?}", options);
        self.capturing.store(true, Ordering::SeqCst);
        println!("(listening...)");
        Ok(())
    }

    async fn stop_listening(&self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn transcript(&self) -> String {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn reset_transcript(&self) {
        self.text.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }
}

/// Stand-in voice for `--text-only`: the agent's words are shown by the event
/// printer, so "synthesis" just passes the text through.
pub struct ConsoleVoice;

#[async_trait]
impl SpeechSynthesizer for ConsoleVoice {
    async fn synthesize(&self, text: &str, _voice_id: &str) -> Result<Vec<u8>> {
        Ok(text.as_bytes().to_vec())
    }
}

#[async_trait]
impl AudioSink for ConsoleVoice {
    async fn play(&self, _audio: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn stop(&self) {}
}

/// Reads stdin on its own thread so a pending read never holds up shutdown.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (line_tx, line_rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to read stdin: {}", e);
                    break;
                }
            }
        }
    });
    line_rx
}

/// Handles console lines until `/quit` or end of input.
pub async fn run_console(
    mut lines: mpsc::Receiver<String>,
    handle: SessionHandle,
    transcript: &ConsoleTranscript,
) -> Result<()> {
    while let Some(line) = lines.recv().await {
        match parse_line(&line) {
            ConsoleLine::Empty => {}
            ConsoleLine::Start => handle.start().await?,
            ConsoleLine::Talk => handle.toggle_capture().await?,
            ConsoleLine::Stop => handle.stop().await?,
            ConsoleLine::NewSong => handle.new_song().await?,
            ConsoleLine::State => {
                let snapshot = handle.snapshot().await?;
                tracing::info!(
                    "Session state: {}",
                    serde_json::to_string_pretty(&snapshot)?
                );
            }
            ConsoleLine::Quit => break,
            ConsoleLine::Text(text) => {
                if transcript.is_capturing() {
                    let heard = transcript.append(&text);
                    handle.send(Input::TranscriptChanged(heard)).await?;
                } else {
                    handle.submit_text(text).await?;
                }
            }
        }
    }
    Ok(())
}

/// Prints the conversation as it happens.
pub async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Turn(turn)) => match turn.speaker {
                Speaker::Agent => println!("TuneGram: {}", turn.text),
                Speaker::User => println!("You: {}", turn.text),
            },
            Ok(SessionEvent::SongReady(song)) => println!("== {} ==", song.title),
            Ok(SessionEvent::PermissionDenied) => {
                eprintln!("Microphone access was denied. Connect an input device and type /start again.")
            }
            Ok(SessionEvent::Error(message)) => {
                eprintln!("Something went wrong: {message}. Type /talk to try again.")
            }
            Ok(event) => tracing::debug!("Session event: {:?}", event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!("Event printer fell behind by {} events", missed)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
