//! Real-time voice conversation pipeline: microphone capture, voice
//! activity detection, speech recognition, a streaming conversational
//! service, incremental text segmentation, and speech synthesis, wired
//! together so the agent starts talking before the full response exists.

pub mod asr;
pub mod audio;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod tts;
pub mod vad;

pub use error::{PipelineError, Result};
