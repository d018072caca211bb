use crate::audio::SynthesizedAudio;
use reqwest::Client;
use serde_json::json;
use std::io::Cursor;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Audio decoding error: {0}")]
    Decoding(String),
    #[error("Empty input text")]
    EmptyInput,
    #[error("Synthesis produced empty audio")]
    EmptyAudio,
}

#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub endpoint: String,
    /// Speaker id within the voice model.
    pub speaker_id: u32,
    pub speed: f32,
    pub timeout: Duration,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8001/v1/audio/speech".to_string(),
            speaker_id: 0,
            speed: 1.0,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Synthesis capability: one text chunk in, one PCM buffer out.
#[async_trait::async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError>;
}

/// Synthesizer backed by an HTTP endpoint returning WAV audio.
pub struct HttpSynthesizer {
    client: Client,
    config: TtsConfig,
}

impl HttpSynthesizer {
    pub fn new(config: TtsConfig) -> Result<Self, TtsError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Decode a WAV body into f32 samples plus its sample rate.
    fn decode_wav(data: &[u8]) -> Result<SynthesizedAudio, TtsError> {
        let mut reader = hound::WavReader::new(Cursor::new(data))
            .map_err(|e| TtsError::Decoding(e.to_string()))?;
        let spec = reader.spec();

        let samples: Result<Vec<f32>, TtsError> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| {
                        s.map(|v| v as f32 / max)
                            .map_err(|e| TtsError::Decoding(e.to_string()))
                    })
                    .collect()
            }
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map_err(|e| TtsError::Decoding(e.to_string())))
                .collect(),
        };

        Ok(SynthesizedAudio {
            samples: samples?,
            sample_rate: spec.sample_rate,
        })
    }
}

#[async_trait::async_trait]
impl Synthesizer for HttpSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, TtsError> {
        // Empty input is rejected before any network call.
        if text.trim().is_empty() {
            return Err(TtsError::EmptyInput);
        }

        let payload = json!({
            "input": text,
            "voice": self.config.speaker_id,
            "speed": self.config.speed,
        });

        let start = Instant::now();
        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TtsError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let audio = Self::decode_wav(&body)?;
        if audio.samples.is_empty() {
            return Err(TtsError::EmptyAudio);
        }

        let elapsed = start.elapsed().as_secs_f32();
        let duration = audio.duration_secs();
        log::info!(
            "TTS: '{}' -> {:.2}s audio in {:.2}s (RTF {:.2})",
            text,
            duration,
            elapsed,
            elapsed / duration
        );

        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_network() {
        // Endpoint is unroutable: if the empty check were missing, this
        // would fail with a transport error instead of EmptyInput.
        let config = TtsConfig {
            endpoint: "http://127.0.0.1:1/unreachable".to_string(),
            ..Default::default()
        };
        let tts = HttpSynthesizer::new(config).unwrap();
        assert!(matches!(
            tts.synthesize("   ").await,
            Err(TtsError::EmptyInput)
        ));
        assert!(matches!(tts.synthesize("").await, Err(TtsError::EmptyInput)));
    }

    #[test]
    fn test_decode_wav() {
        let bytes = wav_bytes(&[0, i16::MAX / 2, i16::MIN / 2], 22050);
        let audio = HttpSynthesizer::decode_wav(&bytes).unwrap();
        assert_eq!(audio.sample_rate, 22050);
        assert_eq!(audio.samples.len(), 3);
        assert!((audio.samples[1] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(HttpSynthesizer::decode_wav(b"not a wav file").is_err());
    }

    #[test]
    fn test_config_defaults() {
        let config = TtsConfig::default();
        assert_eq!(config.speaker_id, 0);
        assert_eq!(config.speed, 1.0);
    }
}
