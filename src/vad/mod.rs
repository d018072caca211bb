//! Voice activity detection.
//!
//! [`SpeechClassifier`] is the narrow per-frame capability the utterance
//! detector consumes; the production implementation wraps the Silero
//! neural VAD. [`detector::UtteranceDetector`] turns the per-frame labels
//! into bounded utterance segments.

pub mod detector;
pub mod silero;

use crate::audio::AudioError;
use strum::{Display, EnumString};

pub use detector::{DetectorConfig, UtteranceDetector, UtteranceSegment};
pub use silero::SileroClassifier;

/// Sample rates supported by Silero VAD
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum VadSampleRate {
    #[strum(serialize = "8kHz")]
    Rate8kHz = 8000,
    #[strum(serialize = "16kHz")]
    Rate16kHz = 16000,
}

impl From<VadSampleRate> for u32 {
    fn from(rate: VadSampleRate) -> Self {
        rate as u32
    }
}

/// Configuration for the Silero speech classifier.
#[derive(Debug, Clone)]
pub struct VadConfig {
    pub sample_rate: VadSampleRate,
    /// Samples per classified frame (512/768/1024 at 16 kHz).
    pub frame_size: usize,
    /// Speech probability threshold (0.0-1.0).
    pub threshold: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: VadSampleRate::Rate16kHz,
            frame_size: crate::audio::FRAME_SIZE,
            threshold: 0.5,
        }
    }
}

/// Per-frame speech/non-speech classification capability.
///
/// Failure is not modeled: an implementation that cannot classify a frame
/// reports non-speech.
pub trait SpeechClassifier: Send {
    fn is_speech(&mut self, frame: &[f32]) -> bool;

    /// Reset internal state between sessions.
    fn reset(&mut self);
}

impl SpeechClassifier for Box<dyn SpeechClassifier + Send> {
    fn is_speech(&mut self, frame: &[f32]) -> bool {
        (**self).is_speech(frame)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

/// Build the production Silero classifier.
pub fn create_classifier(
    config: VadConfig,
) -> Result<Box<dyn SpeechClassifier + Send>, AudioError> {
    Ok(Box::new(SileroClassifier::new(config)?))
}
