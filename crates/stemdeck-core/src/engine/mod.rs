//! Phase-locked playback engine
//!
//! All stems of a session start at one shared clock origin and loop
//! forever from it; mute/unmute only moves a per-stem gain, never the
//! transport. Stopping and restarting an individual stem's transport is
//! the superseded design - a restarted read head loses its phase
//! relationship to the others and never gets it back.

mod command;
mod engine;
mod fader;
mod session;
mod voice;

pub use command::{command_channel, ColdStartRequest, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use engine::{StemEngine, MASTER_GAIN_DEFAULT};
pub use fader::GainFader;
pub use session::{AudibleMarkers, SessionGate};
pub use voice::StemVoice;
