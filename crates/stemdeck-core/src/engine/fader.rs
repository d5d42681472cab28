//! Per-stem gain control
//!
//! The only legal way to silence or unsilence a stem after the
//! synchronized start. Supports stepping to the target immediately or
//! ramping linearly over a short window; every retarget anchors the ramp
//! at the live gain value, so a toggle landing mid-ramp continues from
//! wherever the previous ramp got to instead of jumping.

use crate::types::Sample;

/// Mutable scalar gain in [0, 1] interposed between a voice and the
/// output sum.
#[derive(Debug, Clone)]
pub struct GainFader {
    current: Sample,
    target: Sample,
    /// Per-frame increment while ramping; 0 when settled
    step: Sample,
}

impl GainFader {
    /// Create a fader settled at the given gain
    pub fn new(gain: Sample) -> Self {
        let gain = gain.clamp(0.0, 1.0);
        Self {
            current: gain,
            target: gain,
            step: 0.0,
        }
    }

    /// The live gain value right now
    pub fn gain(&self) -> Sample {
        self.current
    }

    /// The gain the fader is heading toward (equals `gain()` when settled)
    pub fn target(&self) -> Sample {
        self.target
    }

    /// Whether a ramp is still in flight
    pub fn is_ramping(&self) -> bool {
        self.step != 0.0
    }

    /// Retarget the fader
    ///
    /// `fade_frames == 0` steps immediately. Otherwise the ramp starts
    /// from the captured live value - never from the previously requested
    /// target - which is what prevents discontinuities when retargeting
    /// mid-ramp.
    pub fn set_target(&mut self, target: Sample, fade_frames: u64) {
        let target = target.clamp(0.0, 1.0);
        self.target = target;
        if fade_frames == 0 || (target - self.current).abs() < Sample::EPSILON {
            self.current = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / fade_frames as Sample;
        }
    }

    /// Advance one frame and return the gain to apply for it
    #[inline]
    pub fn next_gain(&mut self) -> Sample {
        if self.step != 0.0 {
            self.current += self.step;
            let done = if self.step > 0.0 {
                self.current >= self.target
            } else {
                self.current <= self.target
            };
            if done {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instant_step() {
        let mut fader = GainFader::new(1.0);
        fader.set_target(0.0, 0);
        assert_eq!(fader.gain(), 0.0);
        assert!(!fader.is_ramping());
    }

    #[test]
    fn test_ramp_completes_in_fade_frames() {
        let mut fader = GainFader::new(0.0);
        fader.set_target(1.0, 100);
        for _ in 0..100 {
            fader.next_gain();
        }
        assert_eq!(fader.gain(), 1.0);
        assert!(!fader.is_ramping());
    }

    #[test]
    fn test_ramp_is_monotonic() {
        let mut fader = GainFader::new(1.0);
        fader.set_target(0.0, 50);
        let mut last = fader.gain();
        for _ in 0..50 {
            let g = fader.next_gain();
            assert!(g <= last);
            last = g;
        }
        assert_eq!(last, 0.0);
    }

    #[test]
    fn test_retarget_mid_ramp_anchors_at_live_gain() {
        let mut fader = GainFader::new(0.0);
        fader.set_target(1.0, 100);
        for _ in 0..40 {
            fader.next_gain();
        }
        let live = fader.gain();
        assert!(live > 0.3 && live < 0.5);

        // Reverse direction mid-ramp: the first frame after the retarget
        // must be within one ramp step of the captured live value
        fader.set_target(0.0, 100);
        let next = fader.next_gain();
        assert!((live - next).abs() <= live / 100.0 + Sample::EPSILON);
    }

    #[test]
    fn test_double_toggle_restores_gain() {
        let mut fader = GainFader::new(1.0);
        fader.set_target(0.0, 0);
        fader.set_target(1.0, 0);
        assert_eq!(fader.gain(), 1.0);
    }
}
