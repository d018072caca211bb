//! Turn orchestration: wires recognized utterances into the chat stream,
//! feeds fragments through the segmenter and the directive accumulator,
//! and plays synthesized chunks strictly in order.
//!
//! A turn is fatal on stream transport errors but degrades gracefully on
//! recognition and synthesis failures: a failed transcription skips the
//! turn, a failed chunk synthesis skips that chunk.

use crate::asr::Recognizer;
use crate::audio::playback::AudioPlayback;
use crate::chat::{ChatClient, DirectiveAccumulator, ResponseSegmenter};
use crate::error::{PipelineError, Result};
use crate::tts::{Synthesizer, TtsError};
use crate::vad::detector::UtteranceSegment;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const FRAGMENT_CHANNEL_CAPACITY: usize = 32;

/// What a completed (or cancelled) turn produced.
#[derive(Debug, Default)]
pub struct TurnOutcome {
    /// What the user was heard to say.
    pub transcript: String,
    /// Concatenation of all chunks that were sent to synthesis.
    pub spoken_text: String,
    /// Machine directive extracted from the response trailer, if any.
    pub directive: Option<Value>,
    pub cancelled: bool,
}

pub struct Pipeline {
    recognizer: Arc<dyn Recognizer>,
    chat: Arc<ChatClient>,
    synthesizer: Arc<dyn Synthesizer>,
    /// `None` runs headless: synthesized audio is dropped after timing.
    playback: Option<Arc<AudioPlayback>>,
    /// Static request inputs forwarded with every chat turn.
    base_inputs: Value,
}

impl Pipeline {
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        chat: Arc<ChatClient>,
        synthesizer: Arc<dyn Synthesizer>,
        playback: Option<Arc<AudioPlayback>>,
        base_inputs: Value,
    ) -> Self {
        Self {
            recognizer,
            chat,
            synthesizer,
            playback,
            base_inputs,
        }
    }

    /// Run one full turn for a detected utterance.
    ///
    /// Returns `Ok(None)` when the utterance did not produce a usable
    /// transcript; the pipeline stays idle and waits for the next one.
    pub async fn handle_utterance(
        &self,
        segment: &UtteranceSegment,
        cancel: CancellationToken,
    ) -> Result<Option<TurnOutcome>> {
        let transcript = match self.recognizer.recognize(segment).await {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Recognition failed, skipping turn: {}", e);
                return Ok(None);
            }
        };

        let transcript = transcript.trim();
        if transcript.is_empty() {
            log::debug!("Empty transcript ({:.2}s of audio), skipping turn", segment.duration_secs());
            return Ok(None);
        }

        log::info!("🎤 Heard: {}", transcript);
        let mut outcome = self.run_turn(transcript, cancel).await?;
        outcome.transcript = transcript.to_string();
        Ok(Some(outcome))
    }

    /// Stream one response for `query`, voicing chunks as they complete.
    pub async fn run_turn(&self, query: &str, cancel: CancellationToken) -> Result<TurnOutcome> {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::channel::<String>(FRAGMENT_CHANNEL_CAPACITY);

        let chat = Arc::clone(&self.chat);
        let query_owned = query.to_string();
        let inputs = self.base_inputs.clone();
        let stream_task = tokio::spawn(async move {
            chat.send_streaming(&query_owned, &inputs, tx).await
        });

        // Segmentation state is owned by the turn and dropped with it, so
        // an aborted turn can never leak buffered text into the next one.
        let mut segmenter = ResponseSegmenter::new();
        let mut accumulator = DirectiveAccumulator::new();
        let mut outcome = TurnOutcome::default();
        let mut chunk_count = 0usize;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    outcome.cancelled = true;
                    log::info!("Turn cancelled after {:.0}ms", start.elapsed().as_millis());
                    if let Err(e) = self.chat.stop().await {
                        log::warn!("Failed to stop remote stream: {}", e);
                    }
                    if let Some(playback) = &self.playback {
                        if let Err(e) = playback.stop() {
                            log::warn!("Failed to stop playback: {}", e);
                        }
                    }
                    stream_task.abort();
                    break;
                }
                fragment = rx.recv() => {
                    let Some(fragment) = fragment else { break };
                    accumulator.push(&fragment);
                    if let Some(chunk) = segmenter.push(&fragment) {
                        chunk_count += 1;
                        self.speak(&chunk, &cancel).await;
                        outcome.spoken_text.push_str(&chunk);
                    }
                }
            }
        }

        if !outcome.cancelled {
            match stream_task.await {
                Ok(result) => result?,
                Err(e) => {
                    return Err(PipelineError::MalformedPayload(format!(
                        "stream task failed: {}",
                        e
                    )))
                }
            }

            outcome.directive = accumulator.finish();
            if !segmenter.pending_text().is_empty() {
                log::debug!(
                    "Discarding {} unterminated chars at end of response",
                    segmenter.pending_text().chars().count()
                );
            }
            log::info!(
                "Turn complete: {} chunk(s) in {:.1}s",
                chunk_count,
                start.elapsed().as_secs_f32()
            );
        }

        Ok(outcome)
    }

    /// Synthesize and play one chunk. Failures skip the chunk only.
    async fn speak(&self, chunk: &str, cancel: &CancellationToken) {
        let audio = match self.synthesizer.synthesize(chunk).await {
            Ok(audio) => audio,
            Err(TtsError::EmptyInput) => return,
            Err(e) => {
                log::warn!("Synthesis failed for chunk ({} chars): {}", chunk.chars().count(), e);
                return;
            }
        };

        let Some(playback) = &self.playback else {
            log::debug!("Headless: dropping {:.2}s of audio", audio.duration_secs());
            return;
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = playback.stop();
            }
            result = playback.play(audio) => {
                if let Err(e) = result {
                    log::warn!("Playback failed: {}", e);
                }
            }
        }
    }
}
