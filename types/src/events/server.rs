use super::InboundEvent;
use crate::audio::{Blob, Transcription};

/// One JSON message read from the live connection. Exactly one of the fields
/// is normally present.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<SetupComplete>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub go_away: Option<GoAway>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SetupComplete {}

/// Sent ahead of a server-initiated disconnect.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_complete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_complete: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Blob>,
}

impl ServerMessage {
    pub fn is_setup_complete(&self) -> bool {
        self.setup_complete.is_some()
    }

    /// Flattens `serverContent` into session events, in the order the
    /// session must apply them: transcripts, audio, interruption, turn end.
    pub fn into_events(self) -> Vec<InboundEvent> {
        let Some(content) = self.server_content else {
            return Vec::new();
        };
        let mut events = Vec::new();

        if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
            events.push(InboundEvent::InputTranscription(t.text));
        }
        if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
            events.push(InboundEvent::TranscriptionDelta(t.text));
        }
        if let Some(turn) = content.model_turn {
            for part in turn.parts {
                if let Some(blob) = part.inline_data {
                    if blob.mime_type.starts_with("audio/") {
                        events.push(InboundEvent::AudioDelta(blob.data));
                    }
                }
            }
        }
        if content.interrupted == Some(true) {
            events.push(InboundEvent::Interrupted);
        }
        if content.turn_complete == Some(true) {
            events.push(InboundEvent::TurnComplete);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_complete() {
        let message: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert!(message.is_setup_complete());
        assert!(message.into_events().is_empty());
    }

    #[test]
    fn test_model_turn_with_transcription() {
        let json = r#"{
            "serverContent": {
                "outputTranscription": {"text": "Hi there"},
                "modelTurn": {"parts": [
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAA="}},
                    {"text": "thinking"},
                    {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AQA="}}
                ]}
            }
        }"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message.into_events(),
            vec![
                InboundEvent::TranscriptionDelta("Hi there".to_string()),
                InboundEvent::AudioDelta("AAA=".to_string()),
                InboundEvent::AudioDelta("AQA=".to_string()),
            ]
        );
    }

    #[test]
    fn test_interrupted_and_turn_complete() {
        let json = r#"{"serverContent": {"interrupted": true, "turnComplete": true}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message.into_events(),
            vec![InboundEvent::Interrupted, InboundEvent::TurnComplete]
        );
    }

    #[test]
    fn test_false_flags_and_empty_text_are_ignored() {
        let json = r#"{"serverContent": {"interrupted": false, "turnComplete": false,
            "inputTranscription": {"text": ""}, "generationComplete": true}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(message.into_events().is_empty());
    }

    #[test]
    fn test_input_transcription_comes_first() {
        let json = r#"{"serverContent": {"inputTranscription": {"text": "hello"},
            "outputTranscription": {"text": "hey"}}}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message.into_events(),
            vec![
                InboundEvent::InputTranscription("hello".to_string()),
                InboundEvent::TranscriptionDelta("hey".to_string()),
            ]
        );
    }

    #[test]
    fn test_unknown_fields_are_tolerated() {
        let json = r#"{"usageMetadata": {"totalTokenCount": 12}, "goAway": {"timeLeft": "10s"}, "somethingNew": 1}"#;
        let message: ServerMessage = serde_json::from_str(json).unwrap();
        assert_eq!(message.go_away.unwrap().time_left.as_deref(), Some("10s"));
        assert!(message.usage_metadata.is_some());
    }

    #[test]
    fn test_terminal_events() {
        assert!(InboundEvent::Error("x".to_string()).is_terminal());
        assert!(InboundEvent::Closed(None).is_terminal());
        assert!(!InboundEvent::TurnComplete.is_terminal());
    }
}
