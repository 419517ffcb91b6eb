mod consts;
mod transcription;

pub use consts::*;
pub use transcription::{AudioTranscriptionConfig, Transcription};

/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Inline media payload: base64 data tagged with a MIME descriptor.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: Base64EncodedAudioBytes,
}

impl Blob {
    pub fn new(mime_type: &str, data: Base64EncodedAudioBytes) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }

    /// A 16 kHz mono PCM16 capture chunk.
    pub fn capture_pcm(data: Base64EncodedAudioBytes) -> Self {
        Self::new(CAPTURE_MIME_TYPE, data)
    }
}
