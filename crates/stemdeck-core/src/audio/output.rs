//! CPAL output stream plumbing
//!
//! One f32 output stream whose callback pops pending engine commands and
//! renders the stem engine. Control flow:
//!
//! ```text
//! ┌──────────────────┐                    ┌─────────────────────┐
//! │  Control Thread  │───push()──────────►│   Command Queue     │
//! │ (gate + stdin)   │                    │  (lock-free SPSC)   │
//! └──────────────────┘                    └──────────┬──────────┘
//!         │                                          │ pop()
//!         │ relaxed atomics                          ▼
//! ┌──────────────────┐                    ┌─────────────────────┐
//! │  AudibleMarkers  │◄───────────────────│  CPAL Audio Thread  │
//! │   (lock-free)    │    sync writes     │  (owns StemEngine)  │
//! └──────────────────┘                    └─────────────────────┘
//! ```

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use crate::config::{FadePolicy, DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE};
use crate::engine::{command_channel, AudibleMarkers, EngineCommand, StemEngine};
use crate::types::{StemId, StereoBuffer, SAMPLE_RATE};

use super::error::{AudioError, AudioResult};

/// Audio system configuration
#[derive(Debug, Clone, Default)]
pub struct AudioConfig {
    /// Output device name substring; None picks the default device
    pub device: Option<String>,
    /// Preferred sample rate; None means [`SAMPLE_RATE`]
    pub sample_rate: Option<u32>,
    /// Preferred buffer size in frames; None means [`DEFAULT_BUFFER_SIZE`]
    pub buffer_size: Option<u32>,
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer; pushing is non-blocking. A full queue
/// drops the command with a diagnostic rather than stalling the UI.
pub struct CommandSender {
    producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Wrap a producer
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self { producer }
    }

    /// Send a command to the audio thread (non-blocking)
    pub fn send(&mut self, cmd: EngineCommand) {
        if self.producer.push(cmd).is_err() {
            log::warn!("engine command queue full; command dropped");
        }
    }
}

/// Handle to the running audio system
///
/// Keeps the output stream alive; drop it to stop audio for good.
pub struct AudioHandle {
    stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    /// Sample rate the stream runs at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// Output latency in milliseconds (one-way)
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Resume a suspended stream
    ///
    /// Safe to call on a stream that is already running. This is the
    /// focus-regain path: it never re-runs cold start and never touches
    /// the audible set.
    pub fn resume(&self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamPlayError(e.to_string()))
    }
}

/// Everything the control thread needs after startup
pub struct AudioSystem {
    /// Keeps the stream alive; drop to stop
    pub handle: AudioHandle,
    /// Lock-free command producer for the session gate
    pub command_sender: CommandSender,
    /// Lock-free audible flags for UI reads
    pub markers: Arc<AudibleMarkers>,
    /// Sample rate of the audio system
    pub sample_rate: u32,
}

/// State owned by the output callback
struct AudioCallbackState {
    engine: StemEngine,
    command_rx: rtrb::Consumer<EngineCommand>,
    render_buffer: StereoBuffer,
}

impl AudioCallbackState {
    fn new(engine: StemEngine, command_rx: rtrb::Consumer<EngineCommand>) -> Self {
        Self {
            engine,
            command_rx,
            render_buffer: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    fn process(&mut self, n_frames: usize) {
        // RT-safe: capacity stays at MAX_BUFFER_SIZE, only length changes
        self.render_buffer.set_len_from_capacity(n_frames);
        self.engine.process_commands(&mut self.command_rx);
        self.engine.render(&mut self.render_buffer);
    }
}

/// Start the audio system for a fixed stem list
///
/// Builds the engine, the command channel and the output stream, and
/// starts the stream immediately. The engine stays idle (rendering
/// silence) until a cold-start command arrives.
pub fn start_audio_system(
    config: &AudioConfig,
    policy: FadePolicy,
    stems: &[StemId],
) -> AudioResult<AudioSystem> {
    let device = find_output_device(config.device.as_deref())?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let markers = Arc::new(AudibleMarkers::new(stems));
    let engine = StemEngine::new(sample_rate, policy, Arc::clone(&markers));
    let (command_tx, command_rx) = command_channel();

    let state = Arc::new(std::sync::Mutex::new(AudioCallbackState::new(
        engine, command_rx,
    )));

    let stream = build_output_stream(&device, &stream_config, state)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("audio stream started");

    Ok(AudioSystem {
        handle: AudioHandle {
            stream,
            sample_rate,
            buffer_size,
        },
        command_sender: CommandSender::new(command_tx),
        markers,
        sample_rate,
    })
}

/// Pick the output device: by name substring, or the host default
fn find_output_device(name: Option<&str>) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();

    match name {
        Some(wanted) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
            for device in devices {
                if let Ok(n) = device.name() {
                    if n.contains(wanted) {
                        return Ok(device);
                    }
                }
            }
            Err(AudioError::DeviceNotFound(wanted.to_string()))
        }
        None => host
            .default_output_device()
            .ok_or(AudioError::NoDevices),
    }
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, actual_buffer_size_in_frames).
/// Prefers f32 stereo at the requested rate, falling back to whatever
/// the device offers.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "no supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(SAMPLE_RATE);

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("no suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "audio device doesn't support {}Hz, falling back to {}Hz (stems at the wrong rate will be rejected at load)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = config
        .buffer_size
        .unwrap_or(DEFAULT_BUFFER_SIZE)
        .clamp(64, MAX_BUFFER_SIZE as u32);

    Ok((stream_config, buffer_size))
}

/// Build the output stream
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    state: Arc<std::sync::Mutex<AudioCallbackState>>,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut state = state.lock().unwrap();
                let n_frames = data.len() / channels;

                state.process(n_frames);

                let samples = state.render_buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    if i < samples.len() {
                        let sample = samples[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("audio stream error: {}", err);
            },
            None, // No timeout (blocking)
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
