use live_voice_utils::audio::CodecError;

/// Every way a live voice session can fail. All of them end the session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Microphone unavailable or denied, or an audio device failed mid-session.
    #[error("audio device failure: {0}")]
    DeviceAcquisition(String),
    /// The remote connection errored or closed abruptly.
    #[error("transport error: {0}")]
    Transport(String),
    /// An inbound audio payload could not be decoded.
    #[error("malformed audio payload: {0}")]
    Encoding(#[from] CodecError),
}

impl SessionError {
    pub fn device(e: impl std::fmt::Display) -> Self {
        SessionError::DeviceAcquisition(e.to_string())
    }

    pub fn transport(e: impl std::fmt::Display) -> Self {
        SessionError::Transport(e.to_string())
    }
}
