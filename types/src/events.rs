pub mod client;
pub mod server;

pub use client::{ClientMessage, RealtimeInput};
pub use server::{GoAway, ModelTurn, Part, ServerContent, ServerMessage, SetupComplete};

/// Everything the session reacts to from the remote endpoint, flattened out
/// of the nested server message shape.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Incremental transcription of the user's speech.
    InputTranscription(String),
    /// Incremental transcription of the model's speech.
    TranscriptionDelta(String),
    /// Base64 PCM16 audio at 24 kHz, mono.
    AudioDelta(String),
    TurnComplete,
    Interrupted,
    Error(String),
    Closed(Option<String>),
}

impl InboundEvent {
    /// `Error` and `Closed` end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, InboundEvent::Error(_) | InboundEvent::Closed(_))
    }
}
