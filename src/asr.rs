use crate::vad::UtteranceSegment;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::io::Cursor;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AsrError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Audio encoding error: {0}")]
    Encoding(String),
    #[error("Response parsing error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone)]
pub struct AsrConfig {
    pub endpoint: String,
    pub model: String,
    pub language: Option<String>,
    pub timeout: Duration,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/v1/audio/transcriptions".to_string(),
            model: "whisper-1".to_string(),
            language: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Recognition capability: one utterance in, one transcript out.
///
/// Callers must tolerate failure by degrading to an empty transcript
/// rather than aborting the turn.
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, segment: &UtteranceSegment) -> Result<String, AsrError>;
}

/// Recognizer backed by an OpenAI-compatible transcription endpoint.
///
/// Each segment is encoded as an in-memory 16-bit WAV and posted as
/// multipart form data.
pub struct HttpRecognizer {
    client: Client,
    config: AsrConfig,
}

impl HttpRecognizer {
    pub fn new(config: AsrConfig) -> Result<Self, AsrError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Encode f32 samples as a 16-bit mono WAV in memory.
    fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AsrError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| AsrError::Encoding(e.to_string()))?;
            for &sample in samples {
                let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(value)
                    .map_err(|e| AsrError::Encoding(e.to_string()))?;
            }
            writer
                .finalize()
                .map_err(|e| AsrError::Encoding(e.to_string()))?;
        }

        Ok(cursor.into_inner())
    }
}

#[async_trait::async_trait]
impl Recognizer for HttpRecognizer {
    async fn recognize(&self, segment: &UtteranceSegment) -> Result<String, AsrError> {
        let wav_data = Self::encode_wav(&segment.samples, segment.sample_rate)?;
        log::debug!(
            "ASR: sending {:.2}s utterance ({} bytes WAV)",
            segment.duration_secs(),
            wav_data.len()
        );

        let part = Part::bytes(wav_data)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| AsrError::Encoding(e.to_string()))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone());
        if let Some(language) = &self.config.language {
            form = form.text("language", language.clone());
        }

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AsrError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AsrError::ParseError(e.to_string()))?;

        log::info!(
            "ASR: transcribed in {:.0}ms: '{}'",
            start.elapsed().as_millis(),
            parsed.text
        );

        Ok(parsed.text)
    }
}
