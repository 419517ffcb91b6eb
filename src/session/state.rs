/// Lifecycle of one live voice session.
///
/// ```text
/// Idle ──start──▶ Connecting ──open──▶ Listening ◀──┐
///                                        │           │ playback drained,
///                                 AudioDelta         │ TurnComplete or
///                                        ▼           │ Interrupted
///                                     Speaking ──────┘
/// any ──Error──▶ Error ──teardown──▶ Idle
/// any ──Closed / stop──▶ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Listening,
    Speaking,
    /// Transient: a failure is being torn down.
    Error,
}

impl SessionState {
    /// True while devices or the connection may be held.
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }

    /// True once the remote side is open and audio flows both ways.
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Listening | SessionState::Speaking)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::Speaking => "speaking",
            SessionState::Error => "error",
        }
    }

    /// Next state when model audio starts arriving.
    pub fn on_audio(self) -> Self {
        match self {
            SessionState::Listening => SessionState::Speaking,
            other => other,
        }
    }

    /// Next state when the model's turn ends or its playback drains.
    pub fn on_turn_end(self) -> Self {
        match self {
            SessionState::Speaking => SessionState::Listening,
            other => other,
        }
    }

    /// Next state after a barge-in purge.
    ///
    /// Only `Listening` and `Speaking` become `Listening`. An interruption
    /// before setup completes purges playback but stays in `Connecting`,
    /// because the microphone is not streaming yet.
    pub fn on_interrupted(self) -> Self {
        if self.is_streaming() {
            SessionState::Listening
        } else {
            self
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
