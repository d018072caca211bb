use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Crate-level error for the voice pipeline.
///
/// Module-local errors (`AudioError`, `AsrError`, `ChatError`, `TtsError`)
/// convert into this at the orchestration boundary. The variants follow the
/// turn-level failure taxonomy: device failures stop the affected stage,
/// transport failures kill one turn, recognition and payload failures are
/// degraded paths that never crash a turn.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Audio device error: {0}")]
    Device(#[from] crate::audio::AudioError),

    #[error("Recognition failure: {0}")]
    Recognition(#[from] crate::asr::AsrError),

    #[error("Stream transport error: {0}")]
    StreamTransport(#[from] crate::chat::ChatError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] crate::tts::TtsError),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_convert_to_their_variant() {
        let e: PipelineError = crate::asr::AsrError::ApiError {
            status: 500,
            message: "down".to_string(),
        }
        .into();
        assert!(matches!(e, PipelineError::Recognition(_)));

        let e: PipelineError = crate::tts::TtsError::EmptyInput.into();
        assert!(matches!(e, PipelineError::Synthesis(_)));

        let e: PipelineError = crate::audio::AudioError::Device("gone".to_string()).into();
        assert!(matches!(e, PipelineError::Device(_)));
    }
}
