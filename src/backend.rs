//! Audio devices behind the session: a microphone that feeds the capture
//! pipeline, and an output context with its own clock that plays scheduled
//! sources. The cpal implementation is the production backend; tests use
//! in-memory fakes.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use live_voice_utils::device;

use crate::capture::{AudioSender, CaptureFormat, CapturePipeline};
use crate::error::SessionError;
use crate::playback::{AudioBuffer, OutputContext, SourceId};
use crate::session::{EventSink, SessionEvent};

/// A microphone stream plus its capture processing node.
pub trait Microphone {
    /// Starts delivering frames to the capture pipeline.
    fn resume(&mut self) -> Result<(), SessionError>;
    /// Disconnects the capture node and releases the device.
    fn close(&mut self);
}

/// Acquires the session's audio devices.
pub trait AudioBackend {
    /// Opens the playback context.
    fn open_output(&self, events: EventSink) -> Result<Box<dyn OutputContext>, SessionError>;
    /// Acquires the microphone and wires it to the outbound queue, paused.
    fn open_microphone(
        &self,
        outbound: AudioSender,
        events: EventSink,
    ) -> Result<Box<dyn Microphone>, SessionError>;
}

/// cpal devices, by name or the host defaults.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

impl AudioBackend for CpalBackend {
    fn open_output(&self, events: EventSink) -> Result<Box<dyn OutputContext>, SessionError> {
        let output = device::get_or_default_output(self.output_device.as_deref())
            .map_err(SessionError::device)?;
        tracing::info!("Using output device: {:?}", output.name().unwrap_or_default());

        let supported = output
            .default_output_config()
            .map_err(SessionError::device)?;
        let config: StreamConfig = supported.into();
        tracing::info!("Output stream config: {:?}", &config);

        let mixer = Arc::new(Mutex::new(Mixer::new(config.sample_rate.0)));
        let channels = config.channels as usize;

        let render_mixer = mixer.clone();
        let ended = events.clone();
        let stream = output
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let finished = match render_mixer.lock() {
                        Ok(mut mixer) => mixer.render(data, channels),
                        Err(_) => {
                            data.fill(0.0);
                            Vec::new()
                        }
                    };
                    for id in finished {
                        ended.send(SessionEvent::SourceEnded(id));
                    }
                },
                move |err| {
                    tracing::error!("An error occurred on output stream: {}", err);
                    events.send(SessionEvent::DeviceFault(err.to_string()));
                },
                None,
            )
            .map_err(SessionError::device)?;
        stream.play().map_err(SessionError::device)?;

        Ok(Box::new(CpalOutput {
            stream: Some(stream),
            mixer,
        }))
    }

    fn open_microphone(
        &self,
        outbound: AudioSender,
        events: EventSink,
    ) -> Result<Box<dyn Microphone>, SessionError> {
        let input = device::get_or_default_input(self.input_device.as_deref())
            .map_err(SessionError::device)?;
        tracing::info!("Using input device: {:?}", input.name().unwrap_or_default());

        let supported = input
            .default_input_config()
            .map_err(SessionError::device)?;
        let config: StreamConfig = supported.into();
        tracing::info!("Input stream config: {:?}", &config);

        let format = CaptureFormat {
            channels: config.channels as usize,
            sample_rate: config.sample_rate.0,
        };
        let mut pipeline = CapturePipeline::new(format, outbound).map_err(SessionError::device)?;

        let stream = input
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| pipeline.process(data),
                move |err| {
                    tracing::error!("An error occurred on input stream: {}", err);
                    events.send(SessionEvent::DeviceFault(err.to_string()));
                },
                None,
            )
            .map_err(SessionError::device)?;
        // Some hosts start streams as soon as they are built.
        stream.pause().ok();

        Ok(Box::new(CpalMicrophone {
            stream: Some(stream),
        }))
    }
}

pub struct CpalMicrophone {
    stream: Option<cpal::Stream>,
}

impl Microphone for CpalMicrophone {
    fn resume(&mut self) -> Result<(), SessionError> {
        match &self.stream {
            Some(stream) => stream.play().map_err(SessionError::device),
            None => Err(SessionError::DeviceAcquisition(
                "microphone already closed".to_string(),
            )),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.pause().ok();
            tracing::debug!("microphone released");
        }
    }
}

pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    mixer: Arc<Mutex<Mixer>>,
}

impl OutputContext for CpalOutput {
    fn current_time(&self) -> f64 {
        self.mixer.lock().map(|m| m.current_time()).unwrap_or(0.0)
    }

    fn start_source(
        &mut self,
        id: SourceId,
        buffer: AudioBuffer,
        when: f64,
    ) -> Result<(), SessionError> {
        let mut mixer = self
            .mixer
            .lock()
            .map_err(|_| SessionError::DeviceAcquisition("output mixer poisoned".to_string()))?;
        mixer.add(id, buffer, when);
        Ok(())
    }

    fn stop_source(&mut self, id: SourceId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.remove(id);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.pause().ok();
            tracing::debug!("output context closed");
        }
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
    }
}

struct Voice {
    id: SourceId,
    samples: Vec<f32>,
    /// Exact start on the device timeline, in (fractional) device frames.
    offset: f64,
    /// First device frame the voice sounds on.
    start_frame: u64,
    /// First device frame after the voice.
    end_frame: u64,
    /// Source frames advanced per device frame.
    step: f64,
}

/// Frame-counted output timeline. A source scheduled over `[when, when + duration)`
/// sounds on exactly the device frames whose time falls in that interval, so
/// back-to-back sources never share or skip a frame at any device rate. Samples
/// are read with linear interpolation.
pub(crate) struct Mixer {
    sample_rate: u32,
    frames_rendered: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    pub(crate) fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            frames_rendered: 0,
            voices: Vec::new(),
        }
    }

    pub(crate) fn current_time(&self) -> f64 {
        self.frames_rendered as f64 / self.sample_rate as f64
    }

    /// First device frame at or after `seconds`.
    fn frame_at(&self, seconds: f64) -> u64 {
        // tolerate rounding in the seconds -> frames product
        (seconds * self.sample_rate as f64 - 1e-6).ceil().max(0.0) as u64
    }

    pub(crate) fn add(&mut self, id: SourceId, buffer: AudioBuffer, when: f64) {
        let when = when.max(0.0);
        let end = when + buffer.duration();
        self.voices.push(Voice {
            id,
            offset: when * self.sample_rate as f64,
            start_frame: self.frame_at(when),
            end_frame: self.frame_at(end),
            step: buffer.sample_rate as f64 / self.sample_rate as f64,
            samples: buffer.samples,
        });
    }

    pub(crate) fn remove(&mut self, id: SourceId) {
        self.voices.retain(|v| v.id != id);
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    /// Fills `data` (interleaved, `channels` wide) and returns the sources
    /// that played their last sample during this block.
    pub(crate) fn render(&mut self, data: &mut [f32], channels: usize) -> Vec<SourceId> {
        let channels = channels.max(1);
        for (offset, frame) in data.chunks_mut(channels).enumerate() {
            let now = self.frames_rendered + offset as u64;
            let mut mixed = 0.0f32;
            for voice in &self.voices {
                if now < voice.start_frame || now >= voice.end_frame {
                    continue;
                }
                let pos = ((now as f64 - voice.offset) * voice.step).max(0.0);
                let idx = pos as usize;
                if idx >= voice.samples.len() {
                    continue;
                }
                let frac = (pos - idx as f64) as f32;
                let a = voice.samples[idx];
                let b = voice.samples.get(idx + 1).copied().unwrap_or(a);
                mixed += a + (b - a) * frac;
            }
            frame.fill(mixed.clamp(-1.0, 1.0));
        }
        self.frames_rendered += (data.len() / channels) as u64;

        let end = self.frames_rendered;
        let mut finished = Vec::new();
        self.voices.retain(|v| {
            let done = v.end_frame <= end;
            if done {
                finished.push(v.id);
            }
            !done
        });
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::PlaybackScheduler;

    #[test]
    fn test_clock_counts_frames() {
        let mut mixer = Mixer::new(48000);
        let mut block = vec![0.0; 960];
        mixer.render(&mut block, 2);
        assert_eq!(mixer.current_time(), 0.01);
    }

    #[test]
    fn test_source_starts_on_its_frame_and_reports_end() {
        let mut mixer = Mixer::new(24000);
        mixer.add(SourceId(1), AudioBuffer::new(vec![0.5; 4], 24000), 4.0 / 24000.0);

        let mut block = vec![9.0; 6];
        let finished = mixer.render(&mut block, 1);
        assert_eq!(block, vec![0.0, 0.0, 0.0, 0.0, 0.5, 0.5]);
        assert!(finished.is_empty());

        let mut block = vec![9.0; 4];
        let finished = mixer.render(&mut block, 1);
        assert_eq!(block, vec![0.5, 0.5, 0.0, 0.0]);
        assert_eq!(finished, vec![SourceId(1)]);
    }

    #[test]
    fn test_back_to_back_sources_leave_no_gap() {
        let mut mixer = Mixer::new(24000);
        mixer.add(SourceId(1), AudioBuffer::new(vec![0.25; 3], 24000), 0.0);
        mixer.add(SourceId(2), AudioBuffer::new(vec![0.5; 3], 24000), 3.0 / 24000.0);
        let mut block = vec![0.0; 6];
        let finished = mixer.render(&mut block, 1);
        assert_eq!(block, vec![0.25, 0.25, 0.25, 0.5, 0.5, 0.5]);
        assert_eq!(finished, vec![SourceId(1), SourceId(2)]);
    }

    #[test]
    fn test_upsampled_source_fills_every_channel() {
        let mut mixer = Mixer::new(48000);
        mixer.add(SourceId(7), AudioBuffer::new(vec![0.0, 1.0], 24000), 0.0);
        let mut block = vec![0.0; 8];
        let finished = mixer.render(&mut block, 2);
        assert_eq!(block, vec![0.0, 0.0, 0.5, 0.5, 1.0, 1.0, 1.0, 1.0]);
        assert_eq!(finished, vec![SourceId(7)]);
    }

    #[test]
    fn test_chunks_meet_exactly_at_44k1() {
        let mut mixer = Mixer::new(44100);
        let chunk = || AudioBuffer::new(vec![0.5; 1001], 24000);
        let second = chunk().duration();
        mixer.add(SourceId(1), chunk(), 0.0);
        mixer.add(SourceId(2), chunk(), second);

        let mut block = vec![0.0; 4000];
        let finished = mixer.render(&mut block, 1);
        // 2002 samples at 24 kHz last 3678.75 device frames
        let (sounding, silent) = block.split_at(3679);
        assert!(sounding.iter().all(|&s| s == 0.5), "gap or overlap between chunks");
        assert!(silent.iter().all(|&s| s == 0.0));
        assert_eq!(finished, vec![SourceId(1), SourceId(2)]);
    }

    #[test]
    fn test_scheduler_on_cpal_output_is_gapless_at_44k1() {
        let mixer = Arc::new(Mutex::new(Mixer::new(44100)));
        let mut output = CpalOutput {
            stream: None,
            mixer: mixer.clone(),
        };
        let mut scheduler = PlaybackScheduler::new();

        let mut block = vec![0.0; 512];
        mixer.lock().unwrap().render(&mut block, 2);
        for frames in [1001, 2400, 777, 4096] {
            let buffer = AudioBuffer::new(vec![0.25; frames], 24000);
            scheduler.schedule(&mut output, buffer).unwrap();
        }

        // device clock was at 256 frames; the chunks cover 8274 samples at 24 kHz
        let total: f64 = 8274.0 / 24000.0 * 44100.0;
        let end = (256.0 + total).ceil() as usize;
        let mut block = vec![0.0; (end + 100) * 2];
        let finished = mixer.lock().unwrap().render(&mut block, 2);
        let frames: Vec<f32> = block.chunks(2).map(|f| f[0]).collect();
        let sounding = end - 256;
        assert!(frames[..sounding].iter().all(|&s| s == 0.25));
        assert!(frames[sounding..].iter().all(|&s| s == 0.0));
        assert_eq!(finished.len(), 4);
        for id in finished {
            scheduler.source_ended(id);
        }
        assert_eq!(scheduler.playing(), 0);
    }

    #[test]
    fn test_removed_source_is_silent_and_not_reported() {
        let mut mixer = Mixer::new(24000);
        mixer.add(SourceId(3), AudioBuffer::new(vec![0.5; 10], 24000), 0.0);
        mixer.remove(SourceId(3));
        let mut block = vec![1.0; 12];
        assert!(mixer.render(&mut block, 1).is_empty());
        assert!(block.iter().all(|&s| s == 0.0));
    }
}
