use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// Sample rate of the raw `pcm_f32le` audio requested from the TTS service.
pub const TTS_PCM_F32_SAMPLE_RATE: f64 = 44100.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits a slice of audio samples into a vector of vectors, where each inner vector has a fixed chunk size.
/// If a chunk is smaller than the `chunk_size`, it is padded with zeros.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Runs a whole mono clip through `resampler`.
pub fn resample_all(resampler: &mut FastFixedIn<f32>, samples: &[f32]) -> anyhow::Result<Vec<f32>> {
    let chunk_size = resampler.input_frames_next();
    let mut out = Vec::with_capacity(samples.len());
    for chunk in split_for_chunks(samples, chunk_size) {
        let resampled = resampler.process(&[chunk.as_slice()], None)?;
        if let Some(channel) = resampled.first() {
            out.extend_from_slice(channel);
        }
    }
    Ok(out)
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size.max(1))
}

/// Decodes raw little-endian 32-bit float PCM. A trailing partial sample is dropped.
pub fn decode_pcm_f32le(bytes: &[u8]) -> Vec<f32> {
    let chunks = bytes.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        tracing::debug!("Dropping {} trailing PCM byte(s)", chunks.remainder().len());
    }
    chunks
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]).clamp(-1.0, 1.0))
        .collect()
}

/// Fills an interleaved output buffer from a mono source.
///
/// The sample goes to the left and right channels; any further channels are
/// silent. Frames the source can't fill are silent too. Returns how many
/// frames carried audio.
pub fn fill_interleaved(
    data: &mut [f32],
    channels: usize,
    mut next: impl FnMut() -> Option<f32>,
) -> usize {
    let mut played = 0;
    for frame in data.chunks_mut(channels.max(1)) {
        let sample = match next() {
            Some(sample) => {
                played += 1;
                sample
            }
            None => 0.0,
        };
        for (channel, slot) in frame.iter_mut().enumerate() {
            *slot = if channel < 2 { sample } else { 0.0 };
        }
    }
    played
}
