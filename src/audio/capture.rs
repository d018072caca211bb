use crate::audio::{AudioError, AudioFrame, FRAME_SIZE, SAMPLE_RATE};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Host, Sample, SampleFormat, SizedSample, Stream as CpalStream};
use futures_util::Stream;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Audio capture configuration
#[derive(Debug, Clone, Default)]
pub struct AudioCaptureConfig {
    /// Device name to capture from (None = default device)
    pub device_name: Option<String>,
    /// Channel to capture (0-based index) for multi-channel devices
    pub channel: u32,
}

/// Audio input device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub channel_count: u32,
}

/// Microphone adapter producing fixed-size mono frames at 16 kHz.
///
/// The cpal callback extracts one channel, converts to f32, and sends
/// [`FRAME_SIZE`] sample frames over a channel. The struct implements
/// `Stream<Item = AudioFrame>` so the detector can just `.next().await`.
pub struct AudioCapture {
    _stream: CpalStream,
    rx: mpsc::Receiver<AudioFrame>,
    _host: Host,
}

impl AudioCapture {
    pub fn new(config: AudioCaptureConfig) -> Result<Self, AudioError> {
        let host = cpal::default_host();

        let device = if let Some(name) = &config.device_name {
            host.input_devices()
                .map_err(|e| AudioError::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n.contains(name.as_str())).unwrap_or(false))
                .ok_or_else(|| AudioError::Device(format!("Device not found: {}", name)))?
        } else {
            host.default_input_device()
                .ok_or_else(|| AudioError::Device("No default input device found".into()))?
        };

        log::info!(
            "Using input device: {}",
            device.name().unwrap_or_else(|_| "<unknown>".into())
        );

        let (tx, rx) = mpsc::channel(32);
        let tx = Arc::new(Mutex::new(tx));

        let supported_configs: Vec<_> = device
            .supported_input_configs()
            .map_err(|e| AudioError::Config(e.to_string()))?
            .collect();

        // Prefer a config that natively supports 16 kHz; otherwise fall back
        // to the device default and let cpal handle the rate.
        let supported_config = supported_configs
            .iter()
            .find(|c| c.min_sample_rate().0 <= SAMPLE_RATE && c.max_sample_rate().0 >= SAMPLE_RATE)
            .map(|c| c.with_sample_rate(cpal::SampleRate(SAMPLE_RATE)))
            .map(Ok)
            .unwrap_or_else(|| {
                device
                    .default_input_config()
                    .map_err(|e| AudioError::Config(e.to_string()))
            })?;

        if config.channel >= u32::from(supported_config.channels()) {
            return Err(AudioError::Config(format!(
                "Selected channel {} is not available (device has {} channels)",
                config.channel,
                supported_config.channels()
            )));
        }

        let stream_config = cpal::StreamConfig {
            channels: supported_config.channels(),
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Default,
        };

        log::info!(
            "Audio capture configured: {} channels @ {}Hz (format: {:?})",
            stream_config.channels,
            SAMPLE_RATE,
            supported_config.sample_format()
        );

        let stream = match supported_config.sample_format() {
            SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &stream_config, tx, config.channel)?
            }
            SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &stream_config, tx, config.channel)?
            }
            SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &stream_config, tx, config.channel)?
            }
            _ => return Err(AudioError::Config("Unsupported sample format".into())),
        };

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            rx,
            _host: host,
        })
    }

    fn build_stream<T>(
        device: &Device,
        config: &cpal::StreamConfig,
        tx: Arc<Mutex<mpsc::Sender<AudioFrame>>>,
        channel: u32,
    ) -> Result<CpalStream, AudioError>
    where
        T: Sample + SizedSample + Send + Sync + 'static,
        f32: FromSample<T>,
    {
        let mut buffer = Vec::with_capacity(FRAME_SIZE);
        let channels = config.channels as usize;

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        if let Some(sample) = frame.get(channel as usize) {
                            buffer.push(f32::from_sample(*sample));

                            if buffer.len() >= FRAME_SIZE {
                                if let Ok(tx) = tx.lock() {
                                    // try_send: if the detector falls behind,
                                    // dropping frames beats stalling the
                                    // device callback.
                                    let _ = tx.try_send(AudioFrame {
                                        samples: std::mem::take(&mut buffer),
                                    });
                                }
                                buffer = Vec::with_capacity(FRAME_SIZE);
                            }
                        }
                    }
                },
                |err| log::error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))
    }

    /// List available input devices.
    pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| AudioError::Device(e.to_string()))?;

        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok());

        let mut result = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                let channel_count = device
                    .default_input_config()
                    .map(|c| u32::from(c.channels()))
                    .unwrap_or(0);
                result.push(AudioDeviceInfo {
                    is_default: default_name.as_deref() == Some(name.as_str()),
                    name,
                    channel_count,
                });
            }
        }

        Ok(result)
    }
}

impl Stream for AudioCapture {
    type Item = AudioFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
