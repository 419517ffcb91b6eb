//! Microphone capture: device frames in, encoded realtime chunks out.
//!
//! [`CapturePipeline::process`] runs inside the device callback. It keeps
//! channel 0, resamples to 16 kHz when the device runs at another rate, cuts
//! the stream into 4096-frame windows and pushes each window onto the
//! bounded outbound queue without ever waiting on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use live_voice_types::audio::{Blob, CAPTURE_SAMPLE_RATE, CAPTURE_WINDOW_FRAMES};
use live_voice_utils::audio::{create_resampler, encode};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;

/// Device frames fed to the resampler per call.
pub const INPUT_CHUNK_SIZE: usize = 1024;

/// Layout of the frames the input device delivers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureFormat {
    pub channels: usize,
    pub sample_rate: u32,
}

/// Non-blocking producer side of the outbound capture queue.
#[derive(Debug, Clone)]
pub struct AudioSender {
    tx: mpsc::Sender<Blob>,
    dropped: Arc<AtomicU64>,
}

impl AudioSender {
    pub fn new(tx: mpsc::Sender<Blob>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queues a chunk if there is room. A full queue drops the chunk.
    pub fn offer(&self, chunk: Blob) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!("outbound queue full, dropped capture chunk ({} total)", n);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Chunks lost to back-pressure so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct CapturePipeline {
    format: CaptureFormat,
    resampler: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
    window: Vec<f32>,
    outbound: AudioSender,
    windows_sent: u64,
}

impl CapturePipeline {
    pub fn new(format: CaptureFormat, outbound: AudioSender) -> anyhow::Result<Self> {
        let resampler = if format.sample_rate == CAPTURE_SAMPLE_RATE {
            None
        } else {
            Some(create_resampler(
                format.sample_rate as f64,
                CAPTURE_SAMPLE_RATE as f64,
                INPUT_CHUNK_SIZE,
            )?)
        };
        Ok(Self {
            format,
            resampler,
            pending: Vec::with_capacity(INPUT_CHUNK_SIZE * 2),
            window: Vec::with_capacity(CAPTURE_WINDOW_FRAMES),
            outbound,
            windows_sent: 0,
        })
    }

    /// Consumes one device callback's worth of interleaved samples.
    pub fn process(&mut self, interleaved: &[f32]) {
        let channels = self.format.channels.max(1);
        let mono = interleaved.iter().step_by(channels).copied();

        match self.resampler.as_mut() {
            None => {
                for sample in mono {
                    push_sample(&mut self.window, sample, &self.outbound, &mut self.windows_sent);
                }
            }
            Some(resampler) => {
                self.pending.extend(mono);
                while self.pending.len() >= resampler.input_frames_next() {
                    let needed = resampler.input_frames_next();
                    let block: Vec<f32> = self.pending.drain(..needed).collect();
                    match resampler.process(&[block.as_slice()], None) {
                        Ok(resampled) => {
                            if let Some(resampled) = resampled.first() {
                                for &sample in resampled {
                                    push_sample(
                                        &mut self.window,
                                        sample,
                                        &self.outbound,
                                        &mut self.windows_sent,
                                    );
                                }
                            }
                        }
                        Err(e) => tracing::error!("capture resampling failed: {}", e),
                    }
                }
            }
        }
    }

    pub fn windows_sent(&self) -> u64 {
        self.windows_sent
    }
}

fn push_sample(window: &mut Vec<f32>, sample: f32, outbound: &AudioSender, sent: &mut u64) {
    window.push(sample);
    if window.len() == CAPTURE_WINDOW_FRAMES {
        if outbound.offer(Blob::capture_pcm(encode(window))) {
            *sent += 1;
        }
        window.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use live_voice_utils::audio::decode;

    fn pipeline(
        channels: usize,
        sample_rate: u32,
        capacity: usize,
    ) -> (CapturePipeline, mpsc::Receiver<Blob>, AudioSender) {
        let (tx, rx) = mpsc::channel(capacity);
        let sender = AudioSender::new(tx);
        let format = CaptureFormat {
            channels,
            sample_rate,
        };
        (CapturePipeline::new(format, sender.clone()).unwrap(), rx, sender)
    }

    #[test]
    fn test_full_window_is_sent_partial_is_held() {
        let (mut capture, mut rx, _) = pipeline(1, 16000, 8);
        capture.process(&vec![0.0; 4000]);
        assert!(rx.try_recv().is_err());

        capture.process(&vec![0.0; 200]);
        let chunk = rx.try_recv().unwrap();
        assert_eq!(chunk.mime_type, "audio/pcm;rate=16000");
        assert_eq!(chunk.data.len(), 10924);
        assert_eq!(decode(&chunk.data).unwrap(), vec![0.0; 4096]);
        assert!(rx.try_recv().is_err());
        assert_eq!(capture.windows_sent(), 1);
    }

    #[test]
    fn test_windows_keep_capture_order() {
        let (mut capture, mut rx, _) = pipeline(1, 16000, 8);
        let samples: Vec<f32> = (0..CAPTURE_WINDOW_FRAMES * 3)
            .map(|i| (i / CAPTURE_WINDOW_FRAMES) as f32 * 0.25)
            .collect();
        for block in samples.chunks(1000) {
            capture.process(block);
        }
        for expected in [0.0, 0.25, 0.5] {
            let window = decode(&rx.try_recv().unwrap().data).unwrap();
            assert!(window.iter().all(|&s| (s - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_only_channel_zero_is_captured() {
        let (mut capture, mut rx, _) = pipeline(2, 16000, 8);
        let interleaved: Vec<f32> = (0..CAPTURE_WINDOW_FRAMES)
            .flat_map(|_| [0.5, -0.9])
            .collect();
        capture.process(&interleaved);
        let window = decode(&rx.try_recv().unwrap().data).unwrap();
        assert_eq!(window.len(), CAPTURE_WINDOW_FRAMES);
        assert!(window.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (mut capture, mut rx, sender) = pipeline(1, 16000, 1);
        capture.process(&vec![0.1; CAPTURE_WINDOW_FRAMES * 3]);
        assert_eq!(sender.dropped(), 2);
        assert_eq!(capture.windows_sent(), 1);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_native_rate_is_resampled_to_16k() {
        let (mut capture, mut rx, _) = pipeline(1, 48000, 16);
        // 1.5 s at 48 kHz -> 24000 frames at 16 kHz -> 5 full windows
        for block in vec![0.0f32; 72000].chunks(480) {
            capture.process(block);
        }
        let mut windows = 0;
        while let Ok(chunk) = rx.try_recv() {
            assert_eq!(decode(&chunk.data).unwrap().len(), CAPTURE_WINDOW_FRAMES);
            windows += 1;
        }
        assert!((4..=5).contains(&windows), "got {} windows", windows);
    }
}
