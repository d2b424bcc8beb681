//! Equalizer stage
//!
//! Stored state for the ten fixed bands plus the named gain-curve table.
//! The curve table is a behavioral contract: the values are reproduced
//! verbatim from the classic 18-curve graphic-equalizer set and must not be
//! retuned.

use crate::chain::{default_bands, EqualizerBand, EqualizerSection, BAND_COUNT};
use crate::error::{DspError, Result};

/// Named 10-band gain curves (32 Hz … 16 kHz, dB per band).
pub const GAIN_CURVES: &[(&str, [f32; BAND_COUNT])] = &[
    ("flat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
    ("classical", [5.0, 4.0, 3.0, 2.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0]),
    ("club", [0.0, 0.0, 2.0, 4.0, 4.0, 4.0, 3.0, 2.0, 0.0, 0.0]),
    ("dance", [6.0, 5.0, 2.0, 0.0, 0.0, -2.0, -4.0, -4.0, 0.0, 0.0]),
    ("full-bass", [8.0, 8.0, 6.0, 2.0, 0.0, -2.0, -4.0, -6.0, -8.0, -10.0]),
    ("full-bass-treble", [7.0, 6.0, 4.0, 2.0, -1.0, -1.0, 2.0, 4.0, 6.0, 7.0]),
    ("full-treble", [-10.0, -8.0, -6.0, -4.0, -2.0, 0.0, 2.0, 6.0, 8.0, 10.0]),
    ("headphones", [3.0, 5.0, 3.0, 1.0, 0.0, -1.0, -2.0, -2.0, 0.0, 0.0]),
    ("large-hall", [6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0]),
    ("live", [-3.0, -1.0, 1.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0, 1.0]),
    ("party", [5.0, 5.0, 2.0, 0.0, 0.0, 0.0, 0.0, 2.0, 5.0, 5.0]),
    ("pop", [0.0, 1.0, 3.0, 5.0, 4.0, 1.0, -1.0, -1.0, 1.0, 2.0]),
    ("reggae", [0.0, 0.0, 0.0, -2.0, 0.0, 3.0, 5.0, 3.0, 0.0, 0.0]),
    ("rock", [5.0, 4.0, 3.0, 1.0, -1.0, -2.0, -1.0, 1.0, 3.0, 5.0]),
    ("ska", [-2.0, -2.0, 0.0, 1.0, 3.0, 4.0, 4.0, 3.0, 1.0, 0.0]),
    ("soft", [3.0, 2.0, 1.0, 0.0, -1.0, -1.0, 0.0, 1.0, 3.0, 4.0]),
    ("soft-rock", [3.0, 3.0, 2.0, 1.0, 0.0, -1.0, -2.0, -1.0, 1.0, 3.0]),
    ("techno", [6.0, 5.0, 3.0, 0.0, -2.0, -2.0, 0.0, 3.0, 5.0, 6.0]),
];

/// Look up a named gain curve.
pub fn gain_curve(name: &str) -> Option<&'static [f32; BAND_COUNT]> {
    GAIN_CURVES
        .iter()
        .find(|(curve_name, _)| *curve_name == name)
        .map(|(_, gains)| gains)
}

/// Names of all built-in gain curves, in table order.
pub fn curve_names() -> Vec<&'static str> {
    GAIN_CURVES.iter().map(|(name, _)| *name).collect()
}

/// Stored equalizer state: the ten bands plus the section enable flag.
///
/// This is the control-side authority for the equalizer section of the
/// chain descriptor. Live ramping of the corresponding filter nodes is the
/// engine's job; this type only stores and clamps.
#[derive(Debug, Clone)]
pub struct EqualizerStage {
    enabled: bool,
    bands: Vec<EqualizerBand>,
}

impl Default for EqualizerStage {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: default_bands(),
        }
    }
}

impl EqualizerStage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace stored state from a validated chain section.
    pub fn apply_section(&mut self, section: &EqualizerSection) {
        self.enabled = section.enabled;
        self.bands = section.bands.clone();
        for band in &mut self.bands {
            band.gain = EqualizerBand::clamp_gain(band.gain);
        }
    }

    /// Snapshot the stored state as a chain section (structural copy).
    pub fn section(&self) -> EqualizerSection {
        EqualizerSection {
            enabled: self.enabled,
            bands: self.bands.clone(),
        }
    }

    /// Set one band's gain, clamped to [-20, 20] dB. Returns the stored
    /// value, or `None` when the index is out of range (ignored, not an
    /// error).
    pub fn set_band(&mut self, index: usize, gain_db: f32) -> Option<f32> {
        let band = self.bands.get_mut(index)?;
        band.gain = EqualizerBand::clamp_gain(gain_db);
        Some(band.gain)
    }

    /// All ten gains in band order.
    pub fn gains(&self) -> [f32; BAND_COUNT] {
        let mut gains = [0.0; BAND_COUNT];
        for (slot, band) in gains.iter_mut().zip(&self.bands) {
            *slot = band.gain;
        }
        gains
    }

    pub fn bands(&self) -> &[EqualizerBand] {
        &self.bands
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Reset all ten gains to 0 dB.
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.gain = 0.0;
        }
    }

    /// Load a named gain curve into the stored bands. Returns the applied
    /// gains so the caller can ramp the live nodes.
    pub fn load_curve(&mut self, name: &str) -> Result<[f32; BAND_COUNT]> {
        let gains = gain_curve(name).ok_or_else(|| DspError::PresetNotFound {
            name: name.to_string(),
        })?;
        for (index, &gain) in gains.iter().enumerate() {
            self.set_band(index, gain);
        }
        Ok(*gains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FilterKind, MAX_BAND_GAIN_DB, MIN_BAND_GAIN_DB};
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test]
    fn test_default_layout() {
        let eq = EqualizerStage::new();
        assert!(eq.is_enabled());
        assert_eq!(eq.bands().len(), BAND_COUNT);
        assert_eq!(eq.bands()[0].kind, FilterKind::LowShelf);
        assert_eq!(eq.bands()[9].kind, FilterKind::HighShelf);
        assert_eq!(eq.gains(), [0.0; BAND_COUNT]);
    }

    #[test]
    fn test_set_band_clamps() {
        let mut eq = EqualizerStage::new();
        assert_eq!(eq.set_band(3, 12.0), Some(12.0));
        assert_eq!(eq.set_band(3, 99.0), Some(MAX_BAND_GAIN_DB));
        assert_eq!(eq.set_band(3, -99.0), Some(MIN_BAND_GAIN_DB));
        assert_eq!(eq.set_band(10, 5.0), None);
    }

    #[test]
    fn test_reset() {
        let mut eq = EqualizerStage::new();
        eq.load_curve("rock").unwrap();
        eq.reset();
        assert_eq!(eq.gains(), [0.0; BAND_COUNT]);
    }

    #[test]
    fn test_curve_table_is_complete() {
        assert_eq!(GAIN_CURVES.len(), 18);
        assert_eq!(curve_names().len(), 18);
        assert!(gain_curve("flat").is_some());
        assert!(gain_curve("grunge").is_none());
    }

    #[test_case("flat", [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0])]
    #[test_case("rock", [5.0, 4.0, 3.0, 1.0, -1.0, -2.0, -1.0, 1.0, 3.0, 5.0])]
    #[test_case("classical", [5.0, 4.0, 3.0, 2.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0])]
    #[test_case("full-bass", [8.0, 8.0, 6.0, 2.0, 0.0, -2.0, -4.0, -6.0, -8.0, -10.0])]
    #[test_case("techno", [6.0, 5.0, 3.0, 0.0, -2.0, -2.0, 0.0, 3.0, 5.0, 6.0])]
    fn test_curve_contract(name: &str, expected: [f32; BAND_COUNT]) {
        let mut eq = EqualizerStage::new();
        let applied = eq.load_curve(name).unwrap();
        assert_eq!(applied, expected);
        assert_eq!(eq.gains(), expected);
    }

    #[test]
    fn test_unknown_curve_errors() {
        let mut eq = EqualizerStage::new();
        let err = eq.load_curve("vaporwave").unwrap_err();
        assert_eq!(err.error_code(), "PRESET_NOT_FOUND");
        // Stored state untouched.
        assert_eq!(eq.gains(), [0.0; BAND_COUNT]);
    }

    #[test]
    fn test_section_round_trip() {
        let mut eq = EqualizerStage::new();
        eq.load_curve("pop").unwrap();
        eq.set_enabled(false);

        let section = eq.section();
        let mut restored = EqualizerStage::new();
        restored.apply_section(&section);
        assert_eq!(restored.gains(), eq.gains());
        assert!(!restored.is_enabled());
    }

    #[test]
    fn test_apply_section_clamps() {
        let mut section = EqualizerSection::default();
        section.bands[2].gain = 120.0;
        let mut eq = EqualizerStage::new();
        eq.apply_section(&section);
        assert_eq!(eq.gains()[2], MAX_BAND_GAIN_DB);
    }
}
