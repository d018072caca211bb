//! Silero VAD wrapper over the `voice_activity_detector` crate.

use crate::audio::AudioError;
use crate::vad::{SpeechClassifier, VadConfig};
use voice_activity_detector::VoiceActivityDetector;

pub struct SileroClassifier {
    vad: VoiceActivityDetector,
    config: VadConfig,
    frames_seen: usize,
}

impl SileroClassifier {
    pub fn new(config: VadConfig) -> Result<Self, AudioError> {
        let vad = Self::build(&config)?;

        log::info!(
            "Silero VAD initialized (sample_rate: {}, frame_size: {} samples, threshold: {})",
            config.sample_rate,
            config.frame_size,
            config.threshold
        );

        Ok(Self {
            vad,
            config,
            frames_seen: 0,
        })
    }

    fn build(config: &VadConfig) -> Result<VoiceActivityDetector, AudioError> {
        VoiceActivityDetector::builder()
            .sample_rate(u32::from(config.sample_rate) as i64)
            .chunk_size(config.frame_size)
            .build()
            .map_err(|e| AudioError::Config(format!("Failed to create Silero VAD: {}", e)))
    }
}

impl SpeechClassifier for SileroClassifier {
    fn is_speech(&mut self, frame: &[f32]) -> bool {
        self.frames_seen += 1;
        let probability = self.vad.predict(frame.iter().copied());
        let is_speech = probability >= self.config.threshold;

        if self.frames_seen % 100 == 0 || is_speech {
            log::debug!(
                "Silero VAD: frame {} probability {:.2} -> {}",
                self.frames_seen,
                probability,
                if is_speech { "SPEECH" } else { "silence" }
            );
        }

        is_speech
    }

    fn reset(&mut self) {
        // The crate doesn't expose a reset, so rebuild the detector.
        match Self::build(&self.config) {
            Ok(new_vad) => {
                self.vad = new_vad;
                self.frames_seen = 0;
            }
            Err(e) => {
                log::error!("Failed to reset Silero VAD: {}", e);
            }
        }
    }
}
