use crate::audio::{AudioFrame, SAMPLE_RATE};
use crate::vad::SpeechClassifier;
use tokio::sync::mpsc;

/// One bounded span of detected speech between silence boundaries.
#[derive(Clone, Debug)]
pub struct UtteranceSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl UtteranceSegment {
    pub fn duration_secs(&self) -> f32 {
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Consecutive non-speech frames that close an utterance.
    pub silence_stop_frames: usize,
    /// Ring buffer capacity in seconds; an utterance that never sees a
    /// speech-end is force-finalized at this size.
    pub max_utterance_secs: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            silence_stop_frames: 8, // 256ms of silence at 32ms frames
            max_utterance_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetectorState {
    Idle,
    Speaking,
}

/// Utterance boundary detection state machine.
///
/// `Idle -> Speaking` on the first speech-classified frame; while
/// `Speaking`, frames accumulate into the current segment. After
/// `silence_stop_frames` consecutive non-speech frames the segment is
/// finalized with the trailing silence run truncated, enqueued for the
/// recognizer, and the detector returns to `Idle`. The segment queue is
/// unbounded: the detector never blocks on a slow recognizer, queued
/// utterances are simply processed in capture order.
pub struct UtteranceDetector<C: SpeechClassifier> {
    classifier: C,
    config: DetectorConfig,
    state: DetectorState,
    current: Vec<f32>,
    silence_run: usize,
    frame_size: usize,
    max_samples: usize,
    tx: mpsc::UnboundedSender<UtteranceSegment>,
}

impl<C: SpeechClassifier> UtteranceDetector<C> {
    pub fn new(
        classifier: C,
        config: DetectorConfig,
    ) -> (Self, mpsc::UnboundedReceiver<UtteranceSegment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let max_samples = config.max_utterance_secs as usize * SAMPLE_RATE as usize;
        (
            Self {
                classifier,
                config,
                state: DetectorState::Idle,
                current: Vec::new(),
                silence_run: 0,
                frame_size: 0,
                max_samples,
                tx,
            },
            rx,
        )
    }

    /// Feed one capture frame through the state machine.
    pub fn push_frame(&mut self, frame: &AudioFrame) {
        self.frame_size = frame.samples.len();
        let is_speech = self.classifier.is_speech(&frame.samples);

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    log::debug!("Speech started");
                    self.state = DetectorState::Speaking;
                    self.current.extend_from_slice(&frame.samples);
                    self.silence_run = 0;
                }
                // Non-speech frames in Idle are discarded.
            }
            DetectorState::Speaking => {
                self.current.extend_from_slice(&frame.samples);

                if is_speech {
                    self.silence_run = 0;
                } else {
                    self.silence_run += 1;
                    if self.silence_run >= self.config.silence_stop_frames {
                        log::debug!(
                            "Speech ended after {} silence frames",
                            self.silence_run
                        );
                        self.finalize_segment(true);
                        self.state = DetectorState::Idle;
                        return;
                    }
                }

                // Force-finalize at capacity: losing the tail of a very long
                // utterance is preferred to unbounded memory growth.
                if self.current.len() >= self.max_samples {
                    log::warn!(
                        "Utterance reached {}s capacity, force-finalizing",
                        self.config.max_utterance_secs
                    );
                    self.finalize_segment(false);
                }
            }
        }
    }

    /// Finalize the current segment and queue it for recognition. When the
    /// segment ended on silence, the trailing silence run is truncated so
    /// the recognizer sees only speech-classified audio.
    fn finalize_segment(&mut self, trim_trailing_silence: bool) {
        let mut samples = std::mem::take(&mut self.current);

        if trim_trailing_silence {
            let trailing = self.silence_run * self.frame_size;
            let keep = samples.len().saturating_sub(trailing);
            samples.truncate(keep);
        }
        self.silence_run = 0;

        if samples.is_empty() {
            return;
        }

        let segment = UtteranceSegment {
            samples,
            sample_rate: SAMPLE_RATE,
        };
        log::info!("Utterance finalized: {:.2}s", segment.duration_secs());

        // Receiver dropped means the pipeline is shutting down.
        let _ = self.tx.send(segment);
    }

    /// Reset the state machine and the underlying classifier.
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.current.clear();
        self.silence_run = 0;
        self.classifier.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FRAME_SIZE;

    /// Classifier that replays a scripted label sequence.
    struct ScriptedClassifier {
        labels: Vec<bool>,
        index: usize,
    }

    impl ScriptedClassifier {
        fn new(labels: Vec<bool>) -> Self {
            Self { labels, index: 0 }
        }
    }

    impl SpeechClassifier for ScriptedClassifier {
        fn is_speech(&mut self, _frame: &[f32]) -> bool {
            let label = self.labels.get(self.index).copied().unwrap_or(false);
            self.index += 1;
            label
        }

        fn reset(&mut self) {
            self.index = 0;
        }
    }

    fn frame(value: f32) -> AudioFrame {
        AudioFrame {
            samples: vec![value; FRAME_SIZE],
        }
    }

    fn frames_for_secs(secs: f32) -> usize {
        (secs * SAMPLE_RATE as f32 / FRAME_SIZE as f32) as usize
    }

    #[test_log::test]
    fn test_silence_then_speech_emits_one_segment() {
        let silence_frames = frames_for_secs(5.0);
        let speech_frames = frames_for_secs(2.0);
        let trailing = 20;

        let mut labels = vec![false; silence_frames];
        labels.extend(vec![true; speech_frames]);
        labels.extend(vec![false; trailing]);

        let (mut detector, mut rx) =
            UtteranceDetector::new(ScriptedClassifier::new(labels), DetectorConfig::default());

        for _ in 0..silence_frames {
            detector.push_frame(&frame(0.0));
        }
        for _ in 0..speech_frames {
            detector.push_frame(&frame(0.5));
        }
        for _ in 0..trailing {
            detector.push_frame(&frame(0.0));
        }

        let segment = rx.try_recv().expect("expected one segment");
        // Exactly the speech-classified audio, trailing silence truncated.
        assert_eq!(segment.samples.len(), speech_frames * FRAME_SIZE);
        assert!(segment.samples.iter().all(|&s| s == 0.5));
        assert!(rx.try_recv().is_err(), "expected exactly one segment");
    }

    #[test]
    fn test_idle_frames_are_discarded() {
        let (mut detector, mut rx) = UtteranceDetector::new(
            ScriptedClassifier::new(vec![false; 100]),
            DetectorConfig::default(),
        );

        for _ in 0..100 {
            detector.push_frame(&frame(0.0));
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_short_pause_does_not_split_utterance() {
        let config = DetectorConfig::default();
        // speech, 3-frame pause (below the stop threshold), more speech, end
        let mut labels = vec![true; 10];
        labels.extend(vec![false; 3]);
        labels.extend(vec![true; 10]);
        labels.extend(vec![false; config.silence_stop_frames]);

        let total = labels.len();
        let (mut detector, mut rx) =
            UtteranceDetector::new(ScriptedClassifier::new(labels), config.clone());

        for _ in 0..total {
            detector.push_frame(&frame(0.1));
        }

        let segment = rx.try_recv().expect("expected one segment");
        // Both speech runs plus the mid-utterance pause, minus trailing silence.
        assert_eq!(segment.samples.len(), (10 + 3 + 10) * FRAME_SIZE);
        assert!(rx.try_recv().is_err());
    }

    #[test_log::test]
    fn test_force_finalize_at_capacity() {
        let config = DetectorConfig {
            silence_stop_frames: 8,
            max_utterance_secs: 1,
        };
        let frames_per_sec = frames_for_secs(1.0);
        let total = frames_per_sec * 2 + 2;

        let (mut detector, mut rx) =
            UtteranceDetector::new(ScriptedClassifier::new(vec![true; total]), config);

        for _ in 0..total {
            detector.push_frame(&frame(0.2));
        }

        // Two full segments force-finalized, remainder still buffering.
        let first = rx.try_recv().expect("first force-finalized segment");
        assert!(first.duration_secs() >= 1.0);
        let second = rx.try_recv().expect("second force-finalized segment");
        assert!(second.duration_secs() >= 1.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let (mut detector, mut rx) = UtteranceDetector::new(
            ScriptedClassifier::new(vec![true; 50]),
            DetectorConfig::default(),
        );

        for _ in 0..5 {
            detector.push_frame(&frame(0.3));
        }
        detector.reset();
        assert!(rx.try_recv().is_err(), "reset discards unfinished segment");
    }
}
