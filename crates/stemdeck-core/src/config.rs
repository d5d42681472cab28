//! Engine configuration constants and the fade policy switch

use serde::{Deserialize, Serialize};

/// Lead-in before the synchronized start, in seconds.
///
/// The shared start frame is computed as `now + LEAD_IN_SECONDS` so every
/// voice can be scheduled before the origin elapses. Starting at "now"
/// risks missed starts under scheduler jitter.
pub const LEAD_IN_SECONDS: f64 = 0.1;

/// Ramp length for smooth mute/unmute, in seconds.
///
/// Long enough to avoid audible clicks, short enough to feel instant.
pub const FADE_SECONDS: f64 = 0.05;

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 1024 frames is a safe default for a playback-only application.
pub const DEFAULT_BUFFER_SIZE: u32 = 1024;

/// How a mute/unmute toggle reaches its target gain.
///
/// A configuration choice made once at engine construction; the two modes
/// are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum FadePolicy {
    /// Step the gain to its target at the next rendered frame.
    Instant,
    /// Ramp linearly from the live gain value to the target.
    Smooth {
        /// Ramp duration in seconds
        #[serde(default = "default_fade_seconds")]
        fade_seconds: f64,
    },
}

fn default_fade_seconds() -> f64 {
    FADE_SECONDS
}

impl Default for FadePolicy {
    fn default() -> Self {
        FadePolicy::Smooth { fade_seconds: FADE_SECONDS }
    }
}

impl FadePolicy {
    /// Ramp length in frames at the given sample rate (0 = instant)
    pub fn fade_frames(&self, sample_rate: u32) -> u64 {
        match self {
            FadePolicy::Instant => 0,
            FadePolicy::Smooth { fade_seconds } => {
                (fade_seconds.max(0.0) * sample_rate as f64).round() as u64
            }
        }
    }
}

/// Lead-in length in frames at the given sample rate
pub fn lead_in_frames(sample_rate: u32) -> u64 {
    (LEAD_IN_SECONDS * sample_rate as f64).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_frames() {
        assert_eq!(FadePolicy::Instant.fade_frames(48000), 0);
        assert_eq!(
            FadePolicy::Smooth { fade_seconds: 0.05 }.fade_frames(48000),
            2400
        );
    }

    #[test]
    fn test_lead_in_frames() {
        assert_eq!(lead_in_frames(48000), 4800);
        assert_eq!(lead_in_frames(44100), 4410);
    }

    #[test]
    fn test_fade_policy_yaml() {
        let policy: FadePolicy = serde_yaml::from_str("mode: instant").unwrap();
        assert_eq!(policy, FadePolicy::Instant);

        let policy: FadePolicy = serde_yaml::from_str("mode: smooth").unwrap();
        assert!(matches!(policy, FadePolicy::Smooth { .. }));
    }
}
