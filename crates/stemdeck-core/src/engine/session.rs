//! Session gate and lock-free audible markers
//!
//! The gate is the single entry point for stem control events: the first
//! activation of the session cold-starts the engine with that stem
//! audible, every later activation routes to a mute toggle. The audible
//! markers are the UI-visible side of the same state, written by the
//! audio thread and read lock-free by the control thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::audio::CommandSender;
use crate::loader::{self, BufferCache};
use crate::types::StemId;

use super::command::{ColdStartRequest, EngineCommand};

/// Lock-free per-stem audible flags for UI reads
///
/// The audio thread stores with relaxed ordering whenever toggles land;
/// the control thread only needs visibility, not synchronization.
pub struct AudibleMarkers {
    ids: Vec<StemId>,
    flags: Vec<AtomicBool>,
    index: HashMap<StemId, usize>,
}

impl AudibleMarkers {
    /// Create markers for a fixed stem list, all inaudible
    pub fn new(ids: &[StemId]) -> Self {
        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        Self {
            ids: ids.to_vec(),
            flags: ids.iter().map(|_| AtomicBool::new(false)).collect(),
            index,
        }
    }

    /// Whether a stem is currently audible (lock-free)
    pub fn is_audible(&self, id: &StemId) -> bool {
        self.index
            .get(id)
            .map(|&i| self.flags[i].load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Set a stem's audible flag (lock-free, audio thread)
    pub fn set(&self, id: &StemId, audible: bool) {
        if let Some(&i) = self.index.get(id) {
            self.flags[i].store(audible, Ordering::Relaxed);
        }
    }

    /// Snapshot of every stem's audible flag, in configured order
    pub fn snapshot(&self) -> Vec<(StemId, bool)> {
        self.ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), self.flags[i].load(Ordering::Relaxed)))
            .collect()
    }
}

/// Routes stem activations to cold start or mute toggle
///
/// Uninitialized -> Initialized is the session's only transition and it
/// is terminal. The initialized flag flips synchronously before the
/// (potentially slow) batch load runs, so a second activation arriving
/// while the first is still loading routes to a toggle instead of a
/// second cold start.
pub struct SessionGate {
    stems: Vec<StemId>,
    sample_rate: u32,
    initialized: bool,
    cache: Option<BufferCache>,
    sender: CommandSender,
}

impl SessionGate {
    /// Create a gate for a fixed stem list
    pub fn new(stems: Vec<StemId>, sample_rate: u32, sender: CommandSender) -> Self {
        Self {
            stems,
            sample_rate,
            initialized: false,
            cache: None,
            sender,
        }
    }

    /// Whether the session has started
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Load the stem batch ahead of the first activation
    ///
    /// No-op when buffers are already resident; cold start falls back to
    /// loading on demand if this was never called.
    pub fn preload(&mut self) {
        if self.cache.as_ref().is_some_and(|c| !c.is_empty()) {
            return;
        }
        let cache = loader::load_all(&self.stems, self.sample_rate);
        log::info!("preloaded {}/{} stems", cache.len(), self.stems.len());
        self.cache = Some(cache);
    }

    /// Handle a stem control activation
    ///
    /// First activation: cold start with `stem` audible. Later
    /// activations: toggle `stem`'s audible state.
    pub fn on_activate(&mut self, stem: &StemId) {
        if self.initialized {
            self.sender.send(EngineCommand::Toggle { stem: stem.clone() });
            return;
        }

        // Flag first, load second: re-entry during the load must not
        // cold-start twice.
        self.initialized = true;

        let cache = match self.cache.take() {
            Some(cache) if !cache.is_empty() => cache,
            _ => loader::load_all(&self.stems, self.sample_rate),
        };

        self.sender.send(EngineCommand::ColdStart(Box::new(ColdStartRequest {
            cache,
            active: stem.clone(),
        })));
    }

    /// Stop and discard every voice; the session cannot be restarted
    pub fn shutdown(&mut self) {
        if self.initialized {
            self.sender.send(EngineCommand::Teardown);
        }
    }
}
