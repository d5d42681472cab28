//! Cross-platform audio output for Stemdeck
//!
//! The audio system follows a lock-free design for real-time safety:
//!
//! - **Control thread**: sends commands via a lock-free ringbuffer
//! - **Audio thread**: owns the StemEngine exclusively, applies commands
//!   at frame boundaries
//! - **Atomics**: the control thread reads audible state via relaxed
//!   atomics, never a lock
//!
//! # Example
//!
//! ```ignore
//! use stemdeck_core::audio::{start_audio_system, AudioConfig};
//! use stemdeck_core::config::FadePolicy;
//!
//! let system = start_audio_system(&AudioConfig::default(), FadePolicy::default(), &stems)?;
//! let mut gate = SessionGate::new(stems, system.sample_rate, system.command_sender);
//! gate.on_activate(&stems[0]); // cold start
//! ```

mod error;
mod output;

pub use error::{AudioError, AudioResult};
pub use output::{start_audio_system, AudioConfig, AudioHandle, AudioSystem, CommandSender};
