#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SessionStats {
    audio_chunks_received: u64,
    seconds_scheduled: f64,
    interruptions: u64,
    turns_completed: u64,
    capture_chunks_dropped: u64,
}

impl SessionStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_audio(&mut self, seconds: f64) {
        self.audio_chunks_received += 1;
        self.seconds_scheduled += seconds;
    }

    pub(crate) fn record_interruption(&mut self) {
        self.interruptions += 1;
    }

    pub(crate) fn record_turn(&mut self) {
        self.turns_completed += 1;
    }

    pub(crate) fn set_capture_dropped(&mut self, dropped: u64) {
        self.capture_chunks_dropped = dropped;
    }

    pub fn audio_chunks_received(&self) -> u64 {
        self.audio_chunks_received
    }

    pub fn seconds_scheduled(&self) -> f64 {
        self.seconds_scheduled
    }

    pub fn interruptions(&self) -> u64 {
        self.interruptions
    }

    pub fn turns_completed(&self) -> u64 {
        self.turns_completed
    }

    pub fn capture_chunks_dropped(&self) -> u64 {
        self.capture_chunks_dropped
    }
}
