use crate::audio::{AudioTranscriptionConfig, Modality, Voice};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// The `setup` payload sent once, as the first message of a live connection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Model resource name, e.g. `models/gemini-2.5-flash-native-audio-preview-09-2025`.
    model: String,

    generation_config: GenerationConfig,

    /// System instructions prepended to the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    /// Transcribe the user's microphone audio. Omitted when disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    input_audio_transcription: Option<AudioTranscriptionConfig>,

    /// Transcribe the model's synthesized audio. Omitted when disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Session {
    pub fn builder() -> SessionConfigurator {
        SessionConfigurator::new()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn voice(&self) -> Option<&Voice> {
        self.generation_config
            .speech_config
            .as_ref()
            .map(|s| &s.voice_config.prebuilt_voice_config.voice_name)
    }

    pub fn response_modalities(&self) -> &[Modality] {
        &self.generation_config.response_modalities
    }

    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction
            .as_ref()
            .and_then(|c| c.parts.first())
            .map(|p| p.text.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    response_modalities: Vec<Modality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    voice_name: Voice,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Content {
    parts: Vec<TextPart>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextPart {
    text: String,
}

pub struct SessionConfigurator {
    session: Session,
}

impl SessionConfigurator {
    pub fn new() -> Self {
        Self {
            session: Session {
                model: model_resource(DEFAULT_MODEL),
                generation_config: GenerationConfig {
                    response_modalities: vec![Modality::Audio],
                    speech_config: None,
                },
                system_instruction: None,
                input_audio_transcription: None,
                output_audio_transcription: None,
            },
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.session.model = model_resource(model);
        self
    }

    pub fn with_modalities(mut self, modalities: Vec<Modality>) -> Self {
        self.session.generation_config.response_modalities = modalities;
        self
    }

    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.session.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
            },
        });
        self
    }

    pub fn with_system_instruction(mut self, instruction: &str) -> Self {
        self.session.system_instruction = Some(Content {
            parts: vec![TextPart {
                text: instruction.to_string(),
            }],
        });
        self
    }

    pub fn with_input_audio_transcription_enable(mut self) -> Self {
        self.session.input_audio_transcription = Some(AudioTranscriptionConfig::new());
        self
    }

    pub fn with_output_audio_transcription_enable(mut self) -> Self {
        self.session.output_audio_transcription = Some(AudioTranscriptionConfig::new());
        self
    }

    pub fn build(self) -> Session {
        self.session
    }
}

impl Default for SessionConfigurator {
    fn default() -> Self {
        Self::new()
    }
}

fn model_resource(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}
