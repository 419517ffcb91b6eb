use std::collections::BTreeSet;

use live_voice_types::audio::PLAYBACK_SAMPLE_RATE;
use live_voice_utils::audio::{pcm16_to_float, text_to_bytes};

use crate::error::SessionError;

/// Identifies one scheduled source for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(pub u64);

/// Decoded mono audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes a base64 PCM16 chunk as sent by the live endpoint (24 kHz mono).
    pub fn from_base64_pcm16(data: &str) -> Result<Self, SessionError> {
        let bytes = text_to_bytes(data)?;
        let mut channels = pcm16_to_float(&bytes, 1)?;
        Ok(Self::new(channels.pop().unwrap_or_default(), PLAYBACK_SAMPLE_RATE))
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The playback device as the scheduler sees it: a monotonic clock and the
/// ability to start a buffer at an exact time and to stop it early.
pub trait OutputContext {
    /// Seconds on the device timeline.
    fn current_time(&self) -> f64;
    /// Plays `buffer` starting at `when` seconds. The device reports natural
    /// completion as a `SourceEnded(id)` event.
    fn start_source(
        &mut self,
        id: SourceId,
        buffer: AudioBuffer,
        when: f64,
    ) -> Result<(), SessionError>;
    /// Stops a source immediately. Stopped sources do not report completion.
    fn stop_source(&mut self, id: SourceId);
    fn close(&mut self);
}

/// Places inbound audio chunks back to back on the output timeline.
#[derive(Debug, Default)]
pub struct PlaybackScheduler {
    next_start_time: f64,
    playing: BTreeSet<SourceId>,
    next_id: u64,
}

impl PlaybackScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `buffer` directly after everything already queued, or at the
    /// device's current time if the queue has drained. Returns the source id
    /// and its start time. Empty buffers are not scheduled.
    pub fn schedule(
        &mut self,
        output: &mut dyn OutputContext,
        buffer: AudioBuffer,
    ) -> Result<Option<(SourceId, f64)>, SessionError> {
        if buffer.is_empty() {
            tracing::debug!("skipping empty audio chunk");
            return Ok(None);
        }
        self.next_start_time = self.next_start_time.max(output.current_time());

        let id = SourceId(self.next_id);
        self.next_id += 1;
        let start = self.next_start_time;
        let duration = buffer.duration();

        output.start_source(id, buffer, start)?;
        self.next_start_time += duration;
        self.playing.insert(id);
        tracing::trace!("scheduled {:?} at {:.3}s for {:.3}s", id, start, duration);
        Ok(Some((id, start)))
    }

    /// Forgets a source that finished on its own. Returns `true` when this
    /// was the last one playing.
    pub fn source_ended(&mut self, id: SourceId) -> bool {
        self.playing.remove(&id) && self.playing.is_empty()
    }

    /// Barge-in: stops everything queued or playing and rewinds the clock so
    /// the next chunk anchors to the device's live time.
    pub fn interrupt(&mut self, output: &mut dyn OutputContext) {
        self.stop_all(output);
        self.next_start_time = 0.0;
    }

    pub fn stop_all(&mut self, output: &mut dyn OutputContext) {
        for id in std::mem::take(&mut self.playing) {
            output.stop_source(id);
        }
    }

    /// Drops tracking without touching a device, for when the device is already gone.
    pub fn reset(&mut self) {
        self.playing.clear();
        self.next_start_time = 0.0;
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn playing(&self) -> usize {
        self.playing.len()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Output whose clock only moves when the test says so.
    #[derive(Default)]
    pub(crate) struct ManualOutput {
        pub now: f64,
        pub started: Vec<(SourceId, f64, f64)>,
        pub active: HashMap<SourceId, f64>,
        pub stopped: Vec<SourceId>,
        pub closed: bool,
    }

    impl OutputContext for ManualOutput {
        fn current_time(&self) -> f64 {
            self.now
        }

        fn start_source(
            &mut self,
            id: SourceId,
            buffer: AudioBuffer,
            when: f64,
        ) -> Result<(), SessionError> {
            self.started.push((id, when, buffer.duration()));
            self.active.insert(id, when + buffer.duration());
            Ok(())
        }

        fn stop_source(&mut self, id: SourceId) {
            self.active.remove(&id);
            self.stopped.push(id);
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn buffer(frames: usize) -> AudioBuffer {
        AudioBuffer::new(vec![0.1; frames], PLAYBACK_SAMPLE_RATE)
    }

    #[test]
    fn test_consecutive_chunks_are_gapless() {
        let mut output = ManualOutput {
            now: 2.0,
            ..Default::default()
        };
        let mut scheduler = PlaybackScheduler::new();
        let frames = [2400, 4800, 1200, 24000];

        let mut expected = 2.0;
        for f in frames {
            let (_, start) = scheduler.schedule(&mut output, buffer(f)).unwrap().unwrap();
            assert!((start - expected).abs() < 1e-12, "start {} expected {}", start, expected);
            expected += f as f64 / PLAYBACK_SAMPLE_RATE as f64;
        }
        assert_eq!(scheduler.playing(), 4);
        for pair in output.started.windows(2) {
            let (_, start_a, dur_a) = pair[0];
            let (_, start_b, _) = pair[1];
            assert!((start_a + dur_a - start_b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_anchors_to_device_time_when_queue_drained() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(&mut output, buffer(2400)).unwrap();
        assert!((scheduler.next_start_time() - 0.1).abs() < 1e-12);

        output.now = 5.0;
        let (_, start) = scheduler.schedule(&mut output, buffer(2400)).unwrap().unwrap();
        assert_eq!(start, 5.0);
    }

    #[test]
    fn test_clock_ahead_of_device_is_kept() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new();
        scheduler.schedule(&mut output, buffer(24000)).unwrap();
        output.now = 0.5;
        let (_, start) = scheduler.schedule(&mut output, buffer(2400)).unwrap().unwrap();
        assert_eq!(start, 1.0);
    }

    #[test]
    fn test_interrupt_purges_and_reanchors() {
        let mut output = ManualOutput {
            now: 1.0,
            ..Default::default()
        };
        let mut scheduler = PlaybackScheduler::new();
        for _ in 0..3 {
            scheduler.schedule(&mut output, buffer(24000)).unwrap();
        }
        assert_eq!(scheduler.next_start_time(), 4.0);

        scheduler.interrupt(&mut output);
        assert_eq!(scheduler.playing(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(output.stopped.len(), 3);
        assert!(output.active.is_empty());

        output.now = 1.25;
        let (_, start) = scheduler.schedule(&mut output, buffer(2400)).unwrap().unwrap();
        assert_eq!(start, 1.25);
    }

    #[test]
    fn test_source_ended_reports_last() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new();
        let (a, _) = scheduler.schedule(&mut output, buffer(10)).unwrap().unwrap();
        let (b, _) = scheduler.schedule(&mut output, buffer(10)).unwrap().unwrap();
        assert!(!scheduler.source_ended(a));
        assert!(!scheduler.source_ended(a));
        assert!(scheduler.source_ended(b));
        assert!(!scheduler.source_ended(SourceId(99)));
    }

    #[test]
    fn test_empty_buffer_is_skipped() {
        let mut output = ManualOutput::default();
        let mut scheduler = PlaybackScheduler::new();
        assert!(scheduler.schedule(&mut output, buffer(0)).unwrap().is_none());
        assert!(output.started.is_empty());
        assert_eq!(scheduler.next_start_time(), 0.0);
    }

    #[test]
    fn test_decode_inbound_chunk() {
        // two samples: 16384, -32768
        let buffer = AudioBuffer::from_base64_pcm16("AEAAgA==").unwrap();
        assert_eq!(buffer.samples, vec![0.5, -1.0]);
        assert_eq!(buffer.sample_rate, 24000);
        assert!(matches!(
            AudioBuffer::from_base64_pcm16("AEA"),
            Err(SessionError::Encoding(_))
        ));
    }
}
