//! Stemdeck Core - Phase-locked multi-stem playback

pub mod audio;
pub mod config;
pub mod engine;
pub mod loader;
pub mod types;

pub use types::*;
