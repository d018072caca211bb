//! Tests that need real audio hardware. Run with:
//!   cargo test --features test-audio

#![cfg(feature = "test-audio")]

use voiceloop::audio::capture::{AudioCapture, AudioCaptureConfig};
use voiceloop::audio::playback::{AudioPlayback, PlaybackConfig};
use voiceloop::audio::{SynthesizedAudio, FRAME_SIZE, SAMPLE_RATE};

#[test]
fn test_list_devices_reports_default() {
    let devices = AudioCapture::list_devices().expect("device enumeration failed");
    assert!(!devices.is_empty(), "no input devices found");
    assert!(devices.iter().any(|d| d.is_default));
}

#[tokio::test]
async fn test_capture_produces_fixed_size_frames() {
    use futures_util::StreamExt;

    let mut capture =
        AudioCapture::new(AudioCaptureConfig::default()).expect("capture init failed");

    for _ in 0..5 {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(2), capture.next())
            .await
            .expect("timed out waiting for audio frame")
            .expect("capture stream ended");
        assert_eq!(frame.samples.len(), FRAME_SIZE);
    }
}

#[tokio::test]
async fn test_playback_of_short_tone_completes() {
    let playback = AudioPlayback::new(PlaybackConfig::default()).expect("playback init failed");

    // 100ms 440Hz tone at the pipeline rate; play() returns once drained.
    let samples: Vec<f32> = (0..SAMPLE_RATE / 10)
        .map(|i| (i as f32 * 440.0 * 2.0 * std::f32::consts::PI / SAMPLE_RATE as f32).sin() * 0.2)
        .collect();

    playback
        .play(SynthesizedAudio {
            samples,
            sample_rate: SAMPLE_RATE,
        })
        .await
        .expect("playback failed");
}
