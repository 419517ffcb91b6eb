use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

/// Full-scale magnitude of a 16-bit sample.
const PCM16_SCALE: f32 = 32768.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CodecError {
    #[error("PCM16 payload has an odd length of {0} bytes")]
    OddLength(usize),
    #[error("channel count must be at least 1")]
    NoChannels,
    #[error("invalid base64 payload: {0}")]
    Base64(String),
}

impl From<base64::DecodeError> for CodecError {
    fn from(e: base64::DecodeError) -> Self {
        CodecError::Base64(e.to_string())
    }
}

/// Converts float samples to little-endian PCM16 bytes.
///
/// Each sample is clamped to `[-1.0, 1.0]`, scaled by 32768 and truncated
/// toward zero. `1.0` saturates to `i16::MAX` rather than wrapping to
/// `i16::MIN`. NaN encodes as silence.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            // float-to-int `as` saturates at the i16 bounds and maps NaN to 0
            let v = (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// De-interleaves little-endian PCM16 bytes into one float vector per channel.
///
/// A trailing partial frame is dropped.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> Result<Vec<Vec<f32>>, CodecError> {
    if channels == 0 {
        return Err(CodecError::NoChannels);
    }
    if bytes.len() % 2 != 0 {
        return Err(CodecError::OddLength(bytes.len()));
    }
    let frames = bytes.len() / 2 / channels;
    let mut out = vec![Vec::with_capacity(frames); channels];
    for (i, chunk) in bytes.chunks_exact(2).take(frames * channels).enumerate() {
        let v = i16::from_le_bytes([chunk[0], chunk[1]]);
        out[i % channels].push(v as f32 / PCM16_SCALE);
    }
    Ok(out)
}

/// Text-safe transport encoding (standard padded base64).
pub fn bytes_to_text(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn text_to_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    Ok(base64::engine::general_purpose::STANDARD.decode(text)?)
}

/// Encodes a mono float window straight to base64 PCM16.
pub fn encode(pcm32: &[f32]) -> String {
    bytes_to_text(&float_to_pcm16(pcm32))
}

/// Decodes a base64 PCM16 mono fragment into float samples.
pub fn decode(base64_fragment: &str) -> Result<Vec<f32>, CodecError> {
    let bytes = text_to_bytes(base64_fragment)?;
    let mut channels = pcm16_to_float(&bytes, 1)?;
    Ok(channels.pop().unwrap_or_default())
}

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
    tracing::debug!(
        "resampler created: {}hz -> {}hz, chunk={}",
        in_sampling_rate,
        out_sampling_rate,
        chunk_size
    );
    Ok(resampler)
}
