//! Audio device adapters.
//!
//! The input and output devices are each exclusively owned by one
//! component: [`capture::AudioCapture`] for the microphone and
//! [`playback::AudioPlayback`] for the speaker. No other stage touches
//! cpal directly.

pub mod capture;
pub mod playback;

use thiserror::Error;

pub use capture::{AudioCapture, AudioCaptureConfig, AudioDeviceInfo};
pub use playback::{AudioPlayback, PlaybackConfig};

/// Sample rate the whole pipeline runs at on the capture side.
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per capture frame (32 ms at 16 kHz, matches the Silero chunk size).
pub const FRAME_SIZE: usize = 512;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

/// One fixed-size frame of mono PCM at [`SAMPLE_RATE`].
///
/// Produced by capture, consumed and discarded by the utterance detector.
#[derive(Clone, Debug)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
}

/// PCM produced by the synthesizer, played back exactly once.
#[derive(Clone, Debug)]
pub struct SynthesizedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}
