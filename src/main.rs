use clap::Parser;
use futures_util::StreamExt;
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use voiceloop::{
    asr::{AsrConfig, HttpRecognizer},
    audio::capture::{AudioCapture, AudioCaptureConfig},
    audio::playback::{AudioPlayback, PlaybackConfig},
    chat::{ChatClient, ChatConfig},
    config::load_config,
    context::ConversationLog,
    error::Result as PipelineResult,
    knowledge::{KnowledgeClient, KnowledgeConfig},
    pipeline::Pipeline,
    tts::{HttpSynthesizer, TtsConfig},
    vad::{create_classifier, detector::DetectorConfig, detector::UtteranceDetector, VadConfig},
};

#[derive(Parser, Debug)]
#[command(name = "voiceloop", about = "Real-time voice conversation agent")]
struct Cli {
    /// List available audio input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Input device name (substring match); defaults to the system device
    #[arg(long)]
    device: Option<String>,

    /// End-user identifier sent with every chat request
    #[arg(long, default_value = "voiceloop-user")]
    user: String,

    /// Speaker emotion tag forwarded with every chat request and logged
    /// with each transcript entry
    #[arg(long, default_value = "neutral")]
    emotion: String,

    /// Run without audio output (synthesized audio is discarded)
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> PipelineResult<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.list_devices {
        for device in AudioCapture::list_devices()? {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{} [{} ch]{}", device.name, device.channel_count, marker);
        }
        return Ok(());
    }

    log::info!("🚀 Initializing voiceloop");
    let api_config = load_config()?;

    // Microphone -> VAD -> utterance segments
    let classifier = create_classifier(VadConfig::default())?;
    let (mut detector, mut utterances) = UtteranceDetector::new(classifier, DetectorConfig::default());
    let mut capture = AudioCapture::new(AudioCaptureConfig {
        device_name: cli.device.clone(),
        channel: 0,
    })?;
    log::info!("🎤 Capture and utterance detection initialized");

    // Recognition, conversation, and synthesis
    let recognizer = Arc::new(HttpRecognizer::new(AsrConfig {
        endpoint: api_config
            .asr_url
            .clone()
            .unwrap_or_else(|| AsrConfig::default().endpoint),
        ..AsrConfig::default()
    })?);

    let chat = Arc::new(ChatClient::new(ChatConfig::new(
        api_config.chat_key().to_string(),
        api_config.base_url.clone(),
        cli.user.clone(),
    ))?);

    let synthesizer = Arc::new(HttpSynthesizer::new(TtsConfig {
        endpoint: api_config
            .tts_url
            .clone()
            .unwrap_or_else(|| TtsConfig::default().endpoint),
        ..TtsConfig::default()
    })?);

    let playback = if cli.headless {
        None
    } else {
        Some(Arc::new(AudioPlayback::new(PlaybackConfig::default())?))
    };

    let pipeline = Arc::new(Pipeline::new(
        recognizer,
        chat,
        synthesizer,
        playback,
        json!({ "speaker": cli.user.clone(), "emotion": cli.emotion.clone() }),
    ));
    log::info!("🤖 Pipeline initialized");

    println!("🎧 Listening... speak to start a conversation");
    println!("   Press Ctrl+C to exit");

    // Transcript of the session, persisted to the dataset on exit when
    // knowledge-base access is configured.
    let conversation_log = Arc::new(std::sync::Mutex::new(ConversationLog::new()));

    // One turn in flight at a time; a new utterance preempts it.
    let mut current_turn: Option<(JoinHandle<()>, CancellationToken)> = None;

    loop {
        tokio::select! {
            // The cpal stream handle is not Send, so frames are polled
            // here on the main task rather than in a spawned one.
            frame = capture.next() => {
                let Some(frame) = frame else {
                    log::error!("Audio capture stream ended, shutting down");
                    break;
                };
                detector.push_frame(&frame);
            }

            segment = utterances.recv() => {
                let Some(segment) = segment else {
                    log::error!("Utterance channel closed, shutting down");
                    break;
                };

                if let Some((handle, cancel)) = current_turn.take() {
                    log::info!("🛑 New utterance, cancelling in-flight turn");
                    cancel.cancel();
                    // Let the turn unwind: it stops the remote stream and
                    // playback on its own cancel path.
                    let _ = handle.await;
                }

                log::debug!("Utterance detected: {:.2}s", segment.duration_secs());

                let cancel = CancellationToken::new();
                let pipeline = Arc::clone(&pipeline);
                let log_handle = Arc::clone(&conversation_log);
                let user = cli.user.clone();
                let emotion = cli.emotion.clone();
                let cancel_clone = cancel.clone();

                let handle = tokio::spawn(async move {
                    match pipeline.handle_utterance(&segment, cancel_clone).await {
                        Ok(Some(outcome)) if outcome.cancelled => {}
                        Ok(Some(outcome)) => {
                            if let Some(directive) = &outcome.directive {
                                println!("⚙️  Directive: {}", directive);
                            }
                            if !outcome.spoken_text.is_empty() {
                                println!("🗣️  {}", outcome.spoken_text);
                            }

                            let mut log = log_handle.lock().unwrap();
                            log.new_message(&user, &outcome.transcript, &emotion);
                            if !outcome.spoken_text.is_empty() {
                                log.new_message("assistant", &outcome.spoken_text, &emotion);
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::error!("Turn failed: {}", e);
                            println!("❌ Turn failed: {}", e);
                        }
                    }
                });

                current_turn = Some((handle, cancel));
            }

            Some(result) = async {
                match &mut current_turn {
                    Some((handle, _)) => Some(handle.await),
                    None => None,
                }
            } => {
                current_turn = None;
                if let Err(e) = result {
                    if !e.is_cancelled() {
                        log::error!("Turn task panicked: {}", e);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                log::info!("Received Ctrl+C, shutting down...");
                if let Some((handle, cancel)) = current_turn.take() {
                    cancel.cancel();
                    let _ = handle.await;
                }
                println!("\n👋 Goodbye!");
                break;
            }
        }
    }

    persist_conversation(&api_config, &conversation_log).await;
    Ok(())
}

/// Upload the session transcript to the knowledge dataset, if configured.
async fn persist_conversation(
    api_config: &voiceloop::config::ApiConfig,
    conversation_log: &Arc<std::sync::Mutex<ConversationLog>>,
) {
    let (Some(dataset_key), Some(dataset_id)) =
        (api_config.dataset_key(), api_config.dataset_id.as_deref())
    else {
        return;
    };

    let (rendered, empty) = {
        let log = conversation_log.lock().unwrap();
        (log.render(), log.is_empty())
    };
    if empty {
        return;
    }

    let client = match KnowledgeClient::new(KnowledgeConfig {
        api_key: dataset_key.to_string(),
        base_url: api_config.base_url.clone(),
        dataset_id: dataset_id.to_string(),
    }) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Knowledge client init failed: {}", e);
            return;
        }
    };

    let name = format!(
        "conversation-{}",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    );
    match client.create_document_from_text(&name, &rendered).await {
        Ok(_) => log::info!("Conversation persisted as '{}'", name),
        Err(e) => log::error!("Failed to persist conversation: {}", e),
    }
}
