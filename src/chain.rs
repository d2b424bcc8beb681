//! Processing chain descriptor
//!
//! `ProcessingChain` is the single authoritative description of engine
//! state: equalizer section, compressor settings, and master volume. It is
//! applied atomically, cloned whenever it crosses the public API, and owned
//! exclusively by the engine between those copies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DspError, Result};

/// Number of equalizer bands. Fixed: the band array never grows, shrinks,
/// or reorders.
pub const BAND_COUNT: usize = 10;

/// Canonical center frequencies for the 10-band equalizer, in Hz.
pub const BAND_FREQUENCIES: [f32; BAND_COUNT] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Band gain range in dB. Values outside are clamped, never rejected.
pub const MIN_BAND_GAIN_DB: f32 = -20.0;
pub const MAX_BAND_GAIN_DB: f32 = 20.0;

/// Default Q factor for every band.
pub const DEFAULT_BAND_Q: f32 = 1.0;

/// Filter shape for one equalizer band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Bell curve boost/cut around the center frequency
    #[default]
    Peaking,
    /// Boost/cut below the corner frequency
    #[serde(rename = "lowshelf")]
    LowShelf,
    /// Boost/cut above the corner frequency
    #[serde(rename = "highshelf")]
    HighShelf,
}

/// One parametric filter band at a fixed center frequency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerBand {
    /// Center/corner frequency in Hz
    pub frequency: f32,
    /// Gain in dB, [-20, 20]
    pub gain: f32,
    /// Q factor / bandwidth
    pub q: f32,
    /// Filter shape
    #[serde(rename = "type")]
    pub kind: FilterKind,
}

impl EqualizerBand {
    pub fn new(frequency: f32, gain: f32, q: f32, kind: FilterKind) -> Self {
        Self {
            frequency,
            gain,
            q,
            kind,
        }
    }

    /// Clamp the gain to the legal band range.
    pub fn clamp_gain(gain: f32) -> f32 {
        gain.clamp(MIN_BAND_GAIN_DB, MAX_BAND_GAIN_DB)
    }
}

/// Equalizer section of the chain descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerSection {
    pub enabled: bool,
    pub bands: Vec<EqualizerBand>,
}

impl Default for EqualizerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: default_bands(),
        }
    }
}

/// The canonical flat band layout: low shelf at 32 Hz, high shelf at
/// 16 kHz, peaking filters in between, all at 0 dB.
pub fn default_bands() -> Vec<EqualizerBand> {
    BAND_FREQUENCIES
        .iter()
        .enumerate()
        .map(|(i, &freq)| {
            let kind = match i {
                0 => FilterKind::LowShelf,
                i if i == BAND_COUNT - 1 => FilterKind::HighShelf,
                _ => FilterKind::Peaking,
            };
            EqualizerBand::new(freq, 0.0, DEFAULT_BAND_Q, kind)
        })
        .collect()
}

/// Compressor settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSettings {
    pub enabled: bool,
    /// Threshold in dB
    pub threshold: f32,
    /// Compression ratio (1:1 to 20:1)
    pub ratio: f32,
    /// Attack time in seconds
    pub attack: f32,
    /// Release time in seconds
    pub release: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: -24.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

/// Full processing chain descriptor, applied as one atomic unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingChain {
    pub equalizer: EqualizerSection,
    pub compressor: CompressorSettings,
    /// Master output volume, [0, 1]
    pub master_volume: f32,
}

impl Default for ProcessingChain {
    fn default() -> Self {
        Self {
            equalizer: EqualizerSection::default(),
            compressor: CompressorSettings::default(),
            master_volume: 0.8,
        }
    }
}

impl ProcessingChain {
    /// Structural validation. Range violations are not errors (setters and
    /// `apply_chain` clamp instead); this rejects only descriptors the
    /// engine cannot represent at all.
    pub fn validate(&self) -> Result<()> {
        if self.equalizer.bands.len() != BAND_COUNT {
            return Err(DspError::InvalidChain {
                reason: format!(
                    "expected {} equalizer bands, got {}",
                    BAND_COUNT,
                    self.equalizer.bands.len()
                ),
            });
        }
        for (i, band) in self.equalizer.bands.iter().enumerate() {
            if !band.frequency.is_finite() || !band.gain.is_finite() || !band.q.is_finite() {
                return Err(DspError::InvalidChain {
                    reason: format!("band {i} contains a non-finite value"),
                });
            }
        }
        let c = &self.compressor;
        if !c.threshold.is_finite()
            || !c.ratio.is_finite()
            || !c.attack.is_finite()
            || !c.release.is_finite()
        {
            return Err(DspError::InvalidChain {
                reason: "compressor contains a non-finite value".to_string(),
            });
        }
        if !self.master_volume.is_finite() {
            return Err(DspError::InvalidChain {
                reason: "master volume is not finite".to_string(),
            });
        }
        Ok(())
    }

    /// Clamp all ranged values in place (band gains, compressor ranges,
    /// master volume). Applied before a chain is committed.
    pub fn clamp(&mut self) {
        for band in &mut self.equalizer.bands {
            band.gain = EqualizerBand::clamp_gain(band.gain);
        }
        self.compressor.threshold = self.compressor.threshold.clamp(-100.0, 0.0);
        self.compressor.ratio = self.compressor.ratio.clamp(1.0, 20.0);
        self.compressor.attack = self.compressor.attack.clamp(0.0, 1.0);
        self.compressor.release = self.compressor.release.clamp(0.0, 1.0);
        self.master_volume = self.master_volume.clamp(0.0, 1.0);
    }

    /// Construct a chain from untyped JSON at the transport boundary.
    ///
    /// A descriptor missing the `equalizer` or `compressor` section is
    /// rejected with `InvalidChain` before deserialization is attempted, so
    /// a caller-side shape bug reads as a chain problem rather than a
    /// generic parse failure.
    pub fn from_value(value: Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| DspError::InvalidChain {
            reason: "chain descriptor must be a JSON object".to_string(),
        })?;
        for section in ["equalizer", "compressor"] {
            if !obj.contains_key(section) {
                return Err(DspError::InvalidChain {
                    reason: format!("missing `{section}` section"),
                });
            }
        }
        let chain: ProcessingChain = serde_json::from_value(value)?;
        chain.validate()?;
        Ok(chain)
    }
}

/// Engine-level status snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    /// Whether the engine is enabled at all
    pub enabled: bool,
    /// Whether the render path is actively processing
    pub processing: bool,
    /// Ids of currently enabled effects, in registration order
    pub active_effect_ids: Vec<String>,
}
