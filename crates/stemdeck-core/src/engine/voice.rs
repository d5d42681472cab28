//! Looping playback voice bound to a shared start frame

use std::sync::Arc;

use crate::loader::DecodedBuffer;
use crate::types::StereoSample;

/// A live playback unit for one stem
///
/// Exactly one voice exists per stem while playback is active. A voice
/// cannot be paused or seeked; once created it either runs forever or is
/// irrevocably stopped. Its loop phase is derived from the absolute
/// engine frame, never from accumulated per-voice state, so two voices
/// sharing a start frame stay sample-aligned for any loop duration.
pub struct StemVoice {
    buffer: Arc<DecodedBuffer>,
    start_frame: u64,
    stopped: bool,
}

impl StemVoice {
    /// Bind a buffer to a start frame
    pub fn new(buffer: Arc<DecodedBuffer>, start_frame: u64) -> Self {
        Self {
            buffer,
            start_frame,
            stopped: false,
        }
    }

    /// The shared clock origin this voice was scheduled at
    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    /// Loop length in frames (the buffer's full duration)
    pub fn loop_frames(&self) -> usize {
        self.buffer.len_frames()
    }

    /// Whether the voice has been stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Irrevocably stop the voice; tolerant of repeated calls
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// Sample at an absolute engine frame
    ///
    /// Silence before the start frame and after a stop; otherwise the
    /// buffer frame at `(frame - start) mod loop_len`.
    #[inline]
    pub fn sample_at(&self, frame: u64) -> StereoSample {
        if self.stopped || frame < self.start_frame {
            return StereoSample::silence();
        }
        let len = self.buffer.len_frames();
        if len == 0 {
            return StereoSample::silence();
        }
        let phase = ((frame - self.start_frame) % len as u64) as usize;
        self.buffer.frame(phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_buffer(len: usize) -> Arc<DecodedBuffer> {
        let samples = (0..len).map(|i| StereoSample::mono(i as f32)).collect();
        Arc::new(DecodedBuffer::from_samples(samples, 48000))
    }

    #[test]
    fn test_silence_before_origin() {
        let voice = StemVoice::new(ramp_buffer(4), 100);
        assert_eq!(voice.sample_at(99), StereoSample::silence());
        assert_eq!(voice.sample_at(100), StereoSample::mono(0.0));
    }

    #[test]
    fn test_loop_wraps_at_buffer_length() {
        let voice = StemVoice::new(ramp_buffer(4), 10);
        assert_eq!(voice.sample_at(13), StereoSample::mono(3.0));
        assert_eq!(voice.sample_at(14), StereoSample::mono(0.0));
        // Phase keeps lining up arbitrarily far out
        assert_eq!(voice.sample_at(10 + 4 * 1_000_000 + 2), StereoSample::mono(2.0));
    }

    #[test]
    fn test_stop_is_terminal_and_idempotent() {
        let mut voice = StemVoice::new(ramp_buffer(4), 0);
        voice.stop();
        voice.stop();
        assert!(voice.is_stopped());
        assert_eq!(voice.sample_at(2), StereoSample::silence());
    }
}
