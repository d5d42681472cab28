//! StemEngine - owns the frame clock, voices and faders
//!
//! Lives on the audio thread. Commands arrive through the lock-free
//! queue and are applied at frame boundaries; rendering sums every voice
//! through its fader into the output buffer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::{self, FadePolicy};
use crate::loader::BufferCache;
use crate::types::{StemId, StereoBuffer};

use super::command::EngineCommand;
use super::fader::GainFader;
use super::session::AudibleMarkers;
use super::voice::StemVoice;

/// Default master output gain
///
/// Below unity because several stems at full gain can sum past 0 dBFS.
pub const MASTER_GAIN_DEFAULT: f32 = 0.8;

/// The playback engine for one session
///
/// Owns one looping [`StemVoice`] and one [`GainFader`] per resident
/// stem. The voice set is fixed from cold start to teardown; only fader
/// gains change during a session.
pub struct StemEngine {
    sample_rate: u32,
    lead_in_frames: u64,
    /// Ramp length for toggles; 0 means instant mode
    fade_frames: u64,
    /// Monotonic engine clock, advanced by every rendered frame
    frame: u64,
    voices: HashMap<StemId, StemVoice>,
    faders: HashMap<StemId, GainFader>,
    audible: HashSet<StemId>,
    /// Set on the first honored cold start; terminal for the session
    started: bool,
    master_gain: f32,
    markers: Arc<AudibleMarkers>,
}

impl StemEngine {
    /// Create an idle engine
    pub fn new(sample_rate: u32, policy: FadePolicy, markers: Arc<AudibleMarkers>) -> Self {
        Self {
            sample_rate,
            lead_in_frames: config::lead_in_frames(sample_rate),
            fade_frames: policy.fade_frames(sample_rate),
            frame: 0,
            voices: HashMap::new(),
            faders: HashMap::new(),
            audible: HashSet::new(),
            started: false,
            master_gain: MASTER_GAIN_DEFAULT,
            markers,
        }
    }

    /// Current engine frame
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Sample rate the engine renders at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Whether cold start has been honored
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Number of live voices
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Look up a stem's voice
    pub fn voice(&self, id: &StemId) -> Option<&StemVoice> {
        self.voices.get(id)
    }

    /// A stem's live gain value
    pub fn gain(&self, id: &StemId) -> Option<f32> {
        self.faders.get(id).map(|f| f.gain())
    }

    /// Whether a stem is in the audible set
    pub fn is_audible(&self, id: &StemId) -> bool {
        self.audible.contains(id)
    }

    /// Drain and apply all pending commands (audio thread, frame boundary)
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<EngineCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply(cmd);
        }
    }

    fn apply(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::ColdStart(req) => self.cold_start(req.cache, req.active),
            EngineCommand::Toggle { stem } => self.toggle(&stem),
            EngineCommand::SetMasterGain { gain } => {
                self.master_gain = gain.clamp(0.0, 1.0);
            }
            EngineCommand::Teardown => self.teardown(),
        }
    }

    /// Start synchronized playback of every resident stem
    ///
    /// One clock origin is computed for the whole batch and every voice
    /// is bound to it; `active` starts at gain 1, everything else at 0.
    /// A stem missing from the cache (its load failed) gets no voice and
    /// no fader - later toggles on it are diagnosed no-ops.
    ///
    /// Honored exactly once; duplicates are logged and ignored.
    pub fn cold_start(&mut self, cache: BufferCache, active: StemId) {
        if self.started {
            log::warn!("cold start ignored: session already started");
            return;
        }
        self.started = true;

        // One origin for the whole batch. The lead-in guarantees every
        // voice is scheduled before its start frame elapses.
        let origin = self.frame + self.lead_in_frames;

        for (id, buffer) in cache.into_resident() {
            let gain = if id == active { 1.0 } else { 0.0 };
            self.voices.insert(id.clone(), StemVoice::new(buffer, origin));
            self.faders.insert(id.clone(), GainFader::new(gain));
            self.markers.set(&id, gain == 1.0);
        }

        if self.voices.contains_key(&active) {
            self.audible.insert(active);
        } else {
            log::warn!("activated stem {} has no decoded buffer; nothing audible", active);
        }

        log::info!(
            "cold start: {} voices scheduled at frame {}",
            self.voices.len(),
            origin
        );
    }

    /// Flip a stem's audible state
    ///
    /// Gain-only: the voice keeps reading samples at unchanged phase. In
    /// smooth mode the ramp anchors at the fader's live gain, so toggling
    /// mid-ramp continues from wherever the fade got to.
    pub fn toggle(&mut self, stem: &StemId) {
        let Some(fader) = self.faders.get_mut(stem) else {
            log::warn!("toggle ignored: no volume control for stem {}", stem);
            return;
        };

        let now_audible = !self.audible.contains(stem);
        let target = if now_audible { 1.0 } else { 0.0 };
        fader.set_target(target, self.fade_frames);

        if now_audible {
            self.audible.insert(stem.clone());
        } else {
            self.audible.remove(stem);
        }
        self.markers.set(stem, now_audible);
    }

    /// Irreversible teardown: stop and discard every voice and fader
    ///
    /// There is no pause-and-resume-at-phase once this runs. Stopping an
    /// already-stopped voice is tolerated.
    pub fn teardown(&mut self) {
        for (id, voice) in &mut self.voices {
            voice.stop();
            self.markers.set(id, false);
        }
        self.voices.clear();
        self.faders.clear();
        self.audible.clear();
        log::info!("session torn down");
    }

    /// Render one buffer of audio and advance the engine clock
    pub fn render(&mut self, output: &mut StereoBuffer) {
        output.fill_silence();
        let n = output.len();

        for (id, voice) in &self.voices {
            let Some(fader) = self.faders.get_mut(id) else { continue };
            // Settled-silent stems contribute nothing; skipping them is
            // equivalent to advancing a constant-zero fader.
            if fader.gain() == 0.0 && !fader.is_ramping() {
                continue;
            }
            let out = output.as_mut_slice();
            for (i, slot) in out.iter_mut().enumerate() {
                let gain = fader.next_gain();
                if gain == 0.0 {
                    continue;
                }
                *slot += voice.sample_at(self.frame + i as u64) * gain;
            }
        }

        // Master stage: gain then hard clamp against inter-stem summing overs
        let master = self.master_gain;
        for sample in output.iter_mut() {
            sample.left = (sample.left * master).clamp(-1.0, 1.0);
            sample.right = (sample.right * master).clamp(-1.0, 1.0);
        }

        self.frame += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DecodedBuffer;
    use crate::types::StereoSample;

    const RATE: u32 = 48000;

    fn constant_buffer(value: f32, len: usize) -> DecodedBuffer {
        DecodedBuffer::from_samples(vec![StereoSample::mono(value); len], RATE)
    }

    fn three_stem_cache() -> (BufferCache, [StemId; 3]) {
        let drums = StemId::new("drums.flac");
        let bass = StemId::new("bass.flac");
        let vocals = StemId::new("vocals.flac");

        let mut cache = BufferCache::new();
        cache.insert(drums.clone(), constant_buffer(0.25, 1000));
        cache.insert(bass.clone(), constant_buffer(0.5, 1500));
        cache.insert(vocals.clone(), constant_buffer(0.75, 2000));
        (cache, [drums, bass, vocals])
    }

    fn instant_engine(stems: &[StemId]) -> StemEngine {
        StemEngine::new(RATE, FadePolicy::Instant, Arc::new(AudibleMarkers::new(stems)))
    }

    #[test]
    fn test_cold_start_shares_one_origin() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);

        engine.cold_start(cache, stems[1].clone());

        assert_eq!(engine.voice_count(), 3);
        let expected = config::lead_in_frames(RATE);
        for stem in &stems {
            assert_eq!(engine.voice(stem).unwrap().start_frame(), expected);
        }
    }

    #[test]
    fn test_cold_start_gains_follow_active_stem() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);

        engine.cold_start(cache, stems[1].clone());

        assert_eq!(engine.gain(&stems[0]), Some(0.0));
        assert_eq!(engine.gain(&stems[1]), Some(1.0));
        assert_eq!(engine.gain(&stems[2]), Some(0.0));
        assert!(engine.is_audible(&stems[1]));
        assert!(!engine.is_audible(&stems[0]));
    }

    #[test]
    fn test_duplicate_cold_start_is_ignored() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);

        engine.cold_start(cache, stems[0].clone());
        let first_origin = engine.voice(&stems[0]).unwrap().start_frame();

        // Advance the clock, then replay the cold start
        let mut buf = StereoBuffer::silence(256);
        engine.render(&mut buf);

        let (cache2, _) = three_stem_cache();
        engine.cold_start(cache2, stems[1].clone());

        assert_eq!(engine.voice_count(), 3);
        assert_eq!(engine.voice(&stems[0]).unwrap().start_frame(), first_origin);
        // The duplicate did not re-route audibility either
        assert!(engine.is_audible(&stems[0]));
        assert!(!engine.is_audible(&stems[1]));
    }

    #[test]
    fn test_double_toggle_restores_gain_and_keeps_transport() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);
        engine.cold_start(cache, stems[0].clone());

        let origin = engine.voice(&stems[0]).unwrap().start_frame();

        engine.toggle(&stems[0]);
        assert_eq!(engine.gain(&stems[0]), Some(0.0));
        engine.toggle(&stems[0]);
        assert_eq!(engine.gain(&stems[0]), Some(1.0));

        let voice = engine.voice(&stems[0]).unwrap();
        assert_eq!(voice.start_frame(), origin);
        assert!(!voice.is_stopped());
    }

    #[test]
    fn test_toggle_isolation_between_stems() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);
        engine.cold_start(cache, stems[1].clone());

        engine.toggle(&stems[0]);

        assert_eq!(engine.gain(&stems[1]), Some(1.0));
        assert_eq!(engine.gain(&stems[2]), Some(0.0));
        assert!(engine.is_audible(&stems[1]));
        assert!(!engine.is_audible(&stems[2]));
    }

    #[test]
    fn test_toggle_on_failed_stem_is_noop() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);
        engine.cold_start(cache, stems[0].clone());

        // This stem never loaded: no voice, no fader, no panic
        let missing = StemId::new("guitar.flac");
        engine.toggle(&missing);

        assert!(engine.voice(&missing).is_none());
        assert!(!engine.is_audible(&missing));
        assert_eq!(engine.voice_count(), 3);
    }

    #[test]
    fn test_scenario_bass_first_then_drums() {
        // Activate bass first, then bring drums in and out
        let (cache, stems) = three_stem_cache();
        let [drums, bass, vocals] = stems.clone();
        let mut engine = instant_engine(&stems);

        engine.cold_start(cache, bass.clone());
        assert_eq!(engine.gain(&drums), Some(0.0));
        assert_eq!(engine.gain(&bass), Some(1.0));
        assert_eq!(engine.gain(&vocals), Some(0.0));

        let origins: Vec<u64> = stems
            .iter()
            .map(|s| engine.voice(s).unwrap().start_frame())
            .collect();
        assert!(origins.windows(2).all(|w| w[0] == w[1]));

        engine.toggle(&drums);
        assert_eq!(engine.gain(&drums), Some(1.0));
        assert_eq!(engine.gain(&bass), Some(1.0));
        assert_eq!(engine.gain(&vocals), Some(0.0));

        engine.toggle(&drums);
        assert_eq!(engine.gain(&drums), Some(0.0));
        assert_eq!(engine.gain(&bass), Some(1.0));
    }

    #[test]
    fn test_render_applies_gain_and_loops() {
        let stem = StemId::new("tone.flac");
        let mut cache = BufferCache::new();
        cache.insert(stem.clone(), constant_buffer(0.5, 100));

        let mut engine = instant_engine(std::slice::from_ref(&stem));
        engine.cold_start(cache, stem.clone());

        // Render past the lead-in plus several loop lengths
        let total = config::lead_in_frames(RATE) as usize + 1000;
        let mut buf = StereoBuffer::silence(256);
        let mut last = StereoSample::silence();
        let mut rendered = 0;
        while rendered < total {
            engine.render(&mut buf);
            last = buf[buf.len() - 1];
            rendered += buf.len();
        }

        // Audible stem at constant 0.5 through master gain
        let expected = 0.5 * MASTER_GAIN_DEFAULT;
        assert!((last.left - expected).abs() < 1e-6);

        // Mute: output falls back to silence
        engine.toggle(&stem);
        engine.render(&mut buf);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_smooth_midramp_toggle_reanchors() {
        let stem = StemId::new("pad.flac");
        let mut cache = BufferCache::new();
        cache.insert(stem.clone(), constant_buffer(1.0, 4096));

        let policy = FadePolicy::Smooth { fade_seconds: 0.05 };
        let markers = Arc::new(AudibleMarkers::new(std::slice::from_ref(&stem)));
        let mut engine = StemEngine::new(RATE, policy, markers);
        engine.cold_start(cache, stem.clone());

        // Start fading out, render part of the ramp
        engine.toggle(&stem);
        let mut buf = StereoBuffer::silence(512);
        engine.render(&mut buf);

        let live = engine.gain(&stem).unwrap();
        assert!(live > 0.0 && live < 1.0, "ramp should be in flight, gain={}", live);

        // Toggle back mid-ramp: the fade must continue from the live
        // value, not jump to an endpoint
        engine.toggle(&stem);
        let after = engine.gain(&stem).unwrap();
        assert!((after - live).abs() < 0.01);

        // And it completes back at unity
        for _ in 0..10 {
            engine.render(&mut buf);
        }
        assert_eq!(engine.gain(&stem), Some(1.0));
    }

    #[test]
    fn test_teardown_is_terminal_and_tolerant() {
        let (cache, stems) = three_stem_cache();
        let mut engine = instant_engine(&stems);
        engine.cold_start(cache, stems[0].clone());

        engine.teardown();
        engine.teardown();

        assert_eq!(engine.voice_count(), 0);
        assert!(engine.is_started());

        // Post-teardown commands degrade to diagnosed no-ops
        engine.toggle(&stems[0]);
        let (cache2, _) = three_stem_cache();
        engine.cold_start(cache2, stems[0].clone());
        assert_eq!(engine.voice_count(), 0);

        let mut buf = StereoBuffer::silence(64);
        engine.render(&mut buf);
        assert_eq!(buf.peak(), 0.0);
    }

    #[test]
    fn test_markers_mirror_audible_set() {
        let (cache, stems) = three_stem_cache();
        let markers = Arc::new(AudibleMarkers::new(&stems));
        let mut engine = StemEngine::new(RATE, FadePolicy::Instant, Arc::clone(&markers));

        engine.cold_start(cache, stems[2].clone());
        assert!(markers.is_audible(&stems[2]));
        assert!(!markers.is_audible(&stems[0]));

        engine.toggle(&stems[0]);
        assert!(markers.is_audible(&stems[0]));

        engine.toggle(&stems[2]);
        assert!(!markers.is_audible(&stems[2]));
    }
}
