//! Lock-free command queue for real-time engine control
//!
//! The control thread pushes commands into a bounded SPSC ring buffer;
//! the audio thread pops them at frame boundaries. Neither side ever
//! blocks, so a slow control thread cannot cause an audio dropout and a
//! busy audio callback cannot stall the UI.

use crate::loader::BufferCache;
use crate::types::StemId;

/// Payload for a cold start
///
/// Separated into a struct so it can be boxed in the command enum,
/// keeping the enum small for cache-efficient queueing (the cache holds
/// the session's entire decoded audio).
pub struct ColdStartRequest {
    /// Decoded stems for the session
    pub cache: BufferCache,
    /// The stem that starts audible; every other stem starts at gain 0
    pub active: StemId,
}

/// Commands sent from the control thread to the audio thread
///
/// Each variant is applied atomically at the start of an audio frame,
/// so no mid-frame state changes are observable.
pub enum EngineCommand {
    /// Start synchronized playback of every resident stem
    ///
    /// Honored exactly once per session; a duplicate is a logged no-op.
    ColdStart(Box<ColdStartRequest>),
    /// Flip a stem's audible state (gain only; the transport keeps running)
    Toggle { stem: StemId },
    /// Set the master output gain (0.0 - 1.0)
    SetMasterGain { gain: f32 },
    /// Irreversibly stop and discard every voice
    Teardown,
}

/// Capacity of the command queue
///
/// Toggles arrive at human rates; 64 slots is generous headroom even for
/// a control surface mashing every stem button at once.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// Create a new command channel (producer/consumer pair)
///
/// The producer belongs to the control thread, the consumer to the audio
/// thread.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_channel_roundtrip() {
        let (mut tx, mut rx) = command_channel();

        tx.push(EngineCommand::Toggle { stem: StemId::new("drums.flac") })
            .unwrap();

        let cmd = rx.pop().unwrap();
        assert!(matches!(cmd, EngineCommand::Toggle { ref stem } if stem.as_str() == "drums.flac"));
    }

    #[test]
    fn test_command_channel_empty() {
        let (_tx, mut rx) = command_channel();
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_command_size() {
        // Keep EngineCommand within a cache line for the ring buffer; the
        // big ColdStartRequest payload must stay boxed.
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 32, "EngineCommand is {} bytes, expected <= 32", size);
    }
}
