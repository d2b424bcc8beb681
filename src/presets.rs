//! Preset store
//!
//! Named chain snapshots, insertion-ordered. Loading hands out a deep copy
//! and applying it never aliases store state: mutating the engine after a
//! load leaves the stored preset untouched. Saving overwrites in place so a
//! re-saved preset keeps its position in the list.

use crate::chain::ProcessingChain;
use crate::error::{DspError, Result};

/// Insertion-ordered preset collection, seeded with the built-ins.
#[derive(Debug, Clone)]
pub struct PresetStore {
    presets: Vec<(String, ProcessingChain)>,
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl PresetStore {
    /// An empty store, no built-ins.
    pub fn new() -> Self {
        Self {
            presets: Vec::new(),
        }
    }

    /// The standard factory set, in its canonical order.
    pub fn with_builtins() -> Self {
        let mut store = Self::new();

        store.insert("Flat (Default)", ProcessingChain::default());

        let mut bass_boost = ProcessingChain::default();
        bass_boost.equalizer.bands[0].gain = 8.0;
        bass_boost.equalizer.bands[1].gain = 6.0;
        bass_boost.equalizer.bands[2].gain = 3.0;
        store.insert("Bass Boost", bass_boost);

        let mut vocal = ProcessingChain::default();
        vocal.equalizer.bands[0].gain = -5.0;
        vocal.equalizer.bands[5].gain = 3.0;
        vocal.equalizer.bands[6].gain = 4.0;
        vocal.equalizer.bands[7].gain = 3.0;
        store.insert("Vocal Clarity", vocal);

        let mut heavy = ProcessingChain::default();
        heavy.compressor.enabled = true;
        heavy.compressor.threshold = -35.0;
        heavy.compressor.ratio = 20.0;
        heavy.compressor.attack = 0.001;
        store.insert("Heavy Compression", heavy);

        store
    }

    fn insert(&mut self, name: &str, chain: ProcessingChain) {
        self.presets.push((name.to_string(), chain));
    }

    /// Preset names in insertion order.
    pub fn preset_names(&self) -> Vec<String> {
        self.presets.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.presets.iter().any(|(n, _)| n == name)
    }

    /// Deep copy of a stored preset.
    pub fn load(&self, name: &str) -> Result<ProcessingChain> {
        self.presets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, chain)| chain.clone())
            .ok_or_else(|| DspError::PresetNotFound {
                name: name.to_string(),
            })
    }

    /// Store a deep copy of `chain` under `name`, overwriting in place if
    /// the name exists. Blank names are rejected.
    pub fn save(&mut self, name: &str, chain: &ProcessingChain) -> Result<()> {
        if name.trim().is_empty() {
            return Err(DspError::InvalidName);
        }
        match self.presets.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = chain.clone(),
            None => self.presets.push((name.to_string(), chain.clone())),
        }
        Ok(())
    }

    /// Remove a preset, returning its chain.
    pub fn remove(&mut self, name: &str) -> Result<ProcessingChain> {
        let index = self
            .presets
            .iter()
            .position(|(n, _)| n == name)
            .ok_or_else(|| DspError::PresetNotFound {
                name: name.to_string(),
            })?;
        Ok(self.presets.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}
