use anyhow::{Context, Result};
use async_trait::async_trait;
use tunegram_core::voice_api::{AudioSink, Permission, PermissionGate};
use tunegram_native_utils::audio::decode_pcm_f32le;
use tunegram_native_utils::device::input_available;
use tunegram_native_utils::player::PcmPlayer;

/// Plays synthesized `pcm_f32le` audio on the output device.
pub struct DevicePlayback {
    player: PcmPlayer,
}

impl DevicePlayback {
    pub fn new(player: PcmPlayer) -> Self {
        Self { player }
    }
}

#[async_trait]
impl AudioSink for DevicePlayback {
    async fn play(&self, audio: Vec<u8>) -> Result<()> {
        let samples = decode_pcm_f32le(&audio);
        self.player
            .play_samples(samples)
            .await
            .context("Failed to play audio on the output device")
    }

    async fn stop(&self) {
        self.player.stop();
    }
}

/// Grants the microphone when the host has a usable default input device.
pub struct DevicePermission;

#[async_trait]
impl PermissionGate for DevicePermission {
    async fn request_microphone(&self) -> Permission {
        match tokio::task::spawn_blocking(input_available).await {
            Ok(true) => Permission::Granted,
            Ok(false) => Permission::Denied,
            Err(e) => {
                tracing::warn!("Input device probe failed: {:?}", e);
                Permission::Denied
            }
        }
    }
}

/// For runs without audio hardware.
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn request_microphone(&self) -> Permission {
        Permission::Granted
    }
}
