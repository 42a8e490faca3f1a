use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tunegram_core::voice_api::SpeechSynthesizer;
use tunegram_native_utils::audio::TTS_PCM_F32_SAMPLE_RATE;

const TTS_BYTES_URL: &str = "https://api.cartesia.ai/tts/bytes";
const CARTESIA_VERSION: &str = "2024-06-10";

/// Speech synthesis through Cartesia's `/tts/bytes` endpoint, returning raw `pcm_f32le`.
pub struct CartesiaSynthesizer {
    client: Client,
    api_key: SecretString,
    model: String,
}

impl CartesiaSynthesizer {
    pub fn new(api_key: SecretString, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
        }
    }
}

pub fn request_body(model: &str, transcript: &str, voice_id: &str) -> serde_json::Value {
    serde_json::json!({
        "model_id": model,
        "transcript": transcript,
        "voice": {
            "mode": "id",
            "id": voice_id
        },
        "language": "en",
        "output_format": {
            "container": "raw",
            "encoding": "pcm_f32le",
            "sample_rate": TTS_PCM_F32_SAMPLE_RATE as u32
        }
    })
}

#[async_trait]
impl SpeechSynthesizer for CartesiaSynthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        tracing::debug!("Requesting speech for {} chars", text.chars().count());
        let resp = self
            .client
            .post(TTS_BYTES_URL)
            .header("X-API-Key", self.api_key.expose_secret())
            .header("Cartesia-Version", CARTESIA_VERSION)
            .json(&request_body(&self.model, text, voice_id))
            .send()
            .await
            .context("Failed to reach Cartesia")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Cartesia returned {}: {}", status, body);
        }

        let audio = resp
            .bytes()
            .await
            .context("Failed to read Cartesia audio")?;
        Ok(audio.to_vec())
    }
}
