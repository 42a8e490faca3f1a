mod cartesia;
mod config;
mod console;
mod playback;

use crate::cartesia::CartesiaSynthesizer;
use crate::config::{Config, OUTPUT_BUFFER_MS};
use crate::console::{ConsoleTranscript, ConsoleVoice};
use crate::playback::{AlwaysGranted, DevicePermission, DevicePlayback};
use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::fmt::time::ChronoLocal;
use tunegram_core::session_state::{ConversationSession, VoiceServices};
use tunegram_core::voice_api::{AudioSink, PermissionGate, SpeechSynthesizer};
use tunegram_native_utils::audio::TTS_PCM_F32_SAMPLE_RATE;

#[derive(Parser)]
#[command(version, about = "Talk your way to a personalized song")]
struct Cli {
    /// Print the agent's lines instead of speaking them (no API key or audio device needed)
    #[arg(long)]
    text_only: bool,
    /// Output device to play speech on (defaults to the system output)
    #[arg(long)]
    output_device: Option<String>,
    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
    /// Cartesia voice id, overriding TUNEGRAM_VOICE_ID
    #[arg(long)]
    voice_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Parse Command-Line Arguments ---
    let args = Cli::parse();

    // --- 2. Load Configuration ---
    let needs_api_key = !args.text_only && !args.list_devices;
    let config = Config::from_env(needs_api_key).context("Failed to load application configuration")?;

    // --- 3. Initialize Logging ---
    // Logs go to stderr so they don't interleave with the conversation on stdout.
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        println!("{}", tunegram_native_utils::device::get_available_outputs()?);
        return Ok(());
    }

    tracing::info!("Configuration loaded successfully. Starting TuneGram...");

    let mut session_config = config.session_config();
    if let Some(voice_id) = args.voice_id {
        session_config = session_config.with_voice_id(voice_id);
    }

    // --- 4. Set Up Voice Services ---
    let transcript = Arc::new(ConsoleTranscript::default());
    let synthesizer: Arc<dyn SpeechSynthesizer>;
    let sink: Arc<dyn AudioSink>;
    let permission: Arc<dyn PermissionGate>;
    // The output stream stops playing when dropped, so it lives for all of main.
    let _output_stream: Option<cpal::Stream>;

    if args.text_only {
        let voice = Arc::new(ConsoleVoice);
        synthesizer = voice.clone();
        sink = voice;
        permission = Arc::new(AlwaysGranted);
        _output_stream = None;
    } else {
        let api_key = config
            .cartesia_api_key
            .clone()
            .context("CARTESIA_API_KEY is required for spoken output")?;
        let (stream, player) = tunegram_native_utils::player::open_output(
            args.output_device.clone(),
            TTS_PCM_F32_SAMPLE_RATE,
            OUTPUT_BUFFER_MS,
        )
        .context("Failed to open audio output")?;
        synthesizer = Arc::new(CartesiaSynthesizer::new(
            api_key,
            config.cartesia_model.clone(),
        ));
        sink = Arc::new(DevicePlayback::new(player));
        permission = Arc::new(DevicePermission);
        _output_stream = Some(stream);
    }

    // --- 5. Start the Session ---
    let (session, handle) = ConversationSession::new(
        session_config,
        VoiceServices {
            transcript: transcript.clone(),
            synthesizer,
            sink,
            permission,
        },
    );
    let printer = tokio::spawn(console::print_events(handle.subscribe()));
    let session_task = tokio::spawn(session.run());

    println!("{}", console::USAGE);

    // --- 6. Run Until Quit ---
    tokio::select! {
        result = console::run_console(console::spawn_stdin_reader(), handle.clone(), &transcript) => {
            if let Err(e) = result {
                tracing::error!("Console input stopped: {:?}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C received, shutting down.");
        }
    }

    if let Err(e) = handle.shutdown().await {
        tracing::debug!("Session already closed: {}", e);
    }
    session_task.await.context("Session task panicked")?;
    printer.abort();
    Ok(())
}
