use crate::audio::{create_resampler, fill_interleaved, resample_all, shared_buffer};
use crate::device::get_or_default_output;
use anyhow::{Context, Result};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, StreamTrait};
use ringbuf::HeapProd;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const RESAMPLER_CHUNK_SIZE: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Stop requests from the player, carried out by the device callback.
///
/// Each request bumps a generation. The callback clears the buffer once per
/// outstanding request and records the generation it cleared for, so the
/// player can hold new samples back until that flush has happened.
#[derive(Debug, Default)]
struct FlushSignal {
    requested: AtomicU64,
    applied: AtomicU64,
}

impl FlushSignal {
    fn request(&self) -> u64 {
        self.requested.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn requested(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Runs `flush` if a request is outstanding.
    fn apply(&self, flush: impl FnOnce()) {
        let wanted = self.requested.load(Ordering::Acquire);
        if self.applied.load(Ordering::Acquire) != wanted {
            flush();
            self.applied.store(wanted, Ordering::Release);
        }
    }

    fn is_applied(&self, generation: u64) -> bool {
        self.applied.load(Ordering::Acquire) == generation
    }
}

/// Feeds mono samples to a running output stream and waits for them to be heard.
pub struct PcmPlayer {
    producer: tokio::sync::Mutex<HeapProd<f32>>,
    flush: Arc<FlushSignal>,
    source_rate: f64,
    device_rate: f64,
}

/// Opens the output device and starts a stream that plays whatever the
/// returned [`PcmPlayer`] is given. The stream must be kept alive for as long
/// as the player is used.
pub fn open_output(
    device_name: Option<String>,
    source_rate: f64,
    buffer_ms: usize,
) -> Result<(cpal::Stream, PcmPlayer)> {
    let output = get_or_default_output(device_name).context("Failed to get audio output device")?;
    tracing::info!("Using output device: {:?}", &output.name()?);

    let output_config = output
        .default_output_config()
        .context("Failed to get default output config")?;
    let output_config = StreamConfig {
        channels: output_config.channels(),
        sample_rate: output_config.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::info!("Output stream config: {:?}", &output_config);

    let channels = output_config.channels as usize;
    let device_rate = output_config.sample_rate.0 as f64;
    let capacity = (device_rate as usize * buffer_ms / 1000).max(RESAMPLER_CHUNK_SIZE);
    let (producer, mut consumer) = shared_buffer(capacity).split();

    let flush = Arc::new(FlushSignal::default());
    let flush_signal = flush.clone();
    let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        flush_signal.apply(|| {
            consumer.clear();
        });
        fill_interleaved(data, channels, || consumer.try_pop());
    };

    let stream = output.build_output_stream(
        &output_config,
        output_data_fn,
        move |err| tracing::error!("An error occurred on output stream: {}", err),
        None,
    )?;
    stream.play().context("Failed to start output stream")?;

    let player = PcmPlayer {
        producer: tokio::sync::Mutex::new(producer),
        flush,
        source_rate,
        device_rate,
    };
    Ok((stream, player))
}

impl PcmPlayer {
    /// Plays mono `samples` at the source rate and resolves once the device has drained them,
    /// or as soon as [`stop`](Self::stop) is called.
    pub async fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        let generation = self.flush.requested();
        let samples = if (self.source_rate - self.device_rate).abs() < f64::EPSILON {
            samples
        } else {
            let mut resampler =
                create_resampler(self.source_rate, self.device_rate, RESAMPLER_CHUNK_SIZE)?;
            resample_all(&mut resampler, &samples).context("Failed to resample audio")?
        };
        tracing::debug!("Playing {} samples", samples.len());

        // Anything pushed before an earlier stop is carried out would be cleared with it.
        while !self.flush.is_applied(generation) {
            if self.stopped_since(generation) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        let mut producer = self.producer.lock().await;
        let mut rest = samples.as_slice();
        while !rest.is_empty() {
            if self.stopped_since(generation) {
                return Ok(());
            }
            let pushed = producer.push_slice(rest);
            rest = &rest[pushed..];
            if !rest.is_empty() {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }

        while !producer.is_empty() {
            if self.stopped_since(generation) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    /// Drops everything buffered and releases any pending `play_samples`.
    pub fn stop(&self) {
        let generation = self.flush.request();
        tracing::debug!("Flushing output (generation {})", generation);
    }

    fn stopped_since(&self, generation: u64) -> bool {
        self.flush.requested() != generation
    }
}
