//! Audio backend error types

use thiserror::Error;

/// Errors that can occur while bringing up or running the output stream
#[derive(Error, Debug)]
pub enum AudioError {
    /// No audio output devices available
    #[error("no audio output devices found")]
    NoDevices,

    /// Failed to get default device
    #[error("failed to get default audio device: {0}")]
    NoDefaultDevice(String),

    /// Requested device not found
    #[error("audio device not found: {0}")]
    DeviceNotFound(String),

    /// Failed to get device configuration
    #[error("failed to get device config: {0}")]
    ConfigError(String),

    /// Failed to build the output stream
    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    /// Failed to start/resume the stream
    #[error("failed to start audio stream: {0}")]
    StreamPlayError(String),
}

/// Result type for audio operations
pub type AudioResult<T> = Result<T, AudioError>;
