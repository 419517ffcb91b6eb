use crate::audio::Blob;
use crate::session::Session;

/// Messages written to the live connection.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Session),
    RealtimeInput(RealtimeInput),
}

impl From<Blob> for ClientMessage {
    fn from(media: Blob) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput::new(media))
    }
}

/// `realtimeInput` carrying streamed microphone media.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    media_chunks: Vec<Blob>,
}

impl RealtimeInput {
    pub fn new(media: Blob) -> Self {
        Self {
            media_chunks: vec![media],
        }
    }

    pub fn media_chunks(&self) -> &[Blob] {
        &self.media_chunks
    }
}
