/// Enables server-side transcription of one audio direction.
///
/// The endpoint takes an empty object to switch it on. Leaving the field out
/// of the setup message switches it off.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioTranscriptionConfig {}

impl AudioTranscriptionConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Incremental transcription text, as carried in `serverContent`.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}
