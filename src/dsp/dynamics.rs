//! Dynamics stage
//!
//! Control-side compressor settings with the click-free bypass contract,
//! plus the render-side compressor node (peak envelope follower, hard-knee
//! gain computer).
//!
//! Bypass contract: disabling the compressor never disconnects its node,
//! which would need a graph rebuild and risks an audible glitch. Instead the
//! effective parameters become ratio 1 / threshold 0, which is a
//! mathematical no-op for a compressor.

use crate::chain::CompressorSettings;
use crate::dsp::automation::SmoothedParam;
use crate::dsp::MAX_CHANNELS;

/// Control-side authority for the compressor section of the chain.
#[derive(Debug, Clone, Default)]
pub struct DynamicsStage {
    settings: CompressorSettings,
}

impl DynamicsStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settings(&self) -> CompressorSettings {
        self.settings
    }

    /// Replace stored settings from a validated chain section, clamping
    /// ranges silently.
    pub fn apply_settings(&mut self, settings: &CompressorSettings) {
        self.settings = *settings;
        self.clamp();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn set_threshold(&mut self, threshold_db: f32) {
        self.settings.threshold = threshold_db.clamp(-100.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        self.settings.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_attack(&mut self, attack_secs: f32) {
        self.settings.attack = attack_secs.clamp(0.0, 1.0);
    }

    pub fn set_release(&mut self, release_secs: f32) {
        self.settings.release = release_secs.clamp(0.0, 1.0);
    }

    /// Parameters the live node should run with. When disabled this is the
    /// ratio-1/threshold-0 no-op, not a disconnection.
    pub fn effective(&self) -> CompressorSettings {
        if self.settings.enabled {
            self.settings
        } else {
            CompressorSettings {
                threshold: 0.0,
                ratio: 1.0,
                ..self.settings
            }
        }
    }

    fn clamp(&mut self) {
        self.settings.threshold = self.settings.threshold.clamp(-100.0, 0.0);
        self.settings.ratio = self.settings.ratio.clamp(1.0, 20.0);
        self.settings.attack = self.settings.attack.clamp(0.0, 1.0);
        self.settings.release = self.settings.release.clamp(0.0, 1.0);
    }
}

#[inline]
fn linear_to_db(linear: f32) -> f32 {
    if linear > 0.0 {
        20.0 * linear.log10()
    } else {
        -96.0
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Render-side compressor node.
///
/// Feed-forward design: a peak envelope follower with one-pole
/// attack/release smoothing drives a hard-knee gain computer. Threshold and
/// ratio changes arrive as ramp targets; attack/release changes swap the
/// envelope coefficients directly (they are already smoothing constants).
#[derive(Debug, Clone)]
pub struct CompressorNode {
    threshold_db: SmoothedParam,
    ratio: SmoothedParam,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f32,
    envelope: [f32; MAX_CHANNELS],
}

impl CompressorNode {
    pub fn new(settings: CompressorSettings, sample_rate: f32) -> Self {
        let mut node = Self {
            threshold_db: SmoothedParam::new(settings.threshold, sample_rate),
            ratio: SmoothedParam::new(settings.ratio, sample_rate),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
            envelope: [0.0; MAX_CHANNELS],
        };
        node.set_times(settings.attack, settings.release);
        node
    }

    /// Retarget from new effective settings. Threshold and ratio ramp;
    /// attack/release take effect at the next block.
    pub fn apply(&mut self, settings: CompressorSettings) {
        self.threshold_db.set_target(settings.threshold);
        self.ratio.set_target(settings.ratio);
        self.set_times(settings.attack, settings.release);
    }

    pub fn set_ramp_secs(&mut self, ramp_secs: f32) {
        self.threshold_db.set_ramp_secs(ramp_secs);
        self.ratio.set_ramp_secs(ramp_secs);
    }

    fn set_times(&mut self, attack_secs: f32, release_secs: f32) {
        let attack_samples = attack_secs * self.sample_rate;
        let release_samples = release_secs * self.sample_rate;
        self.attack_coeff = if attack_samples > 0.0 {
            (-1.0 / attack_samples).exp()
        } else {
            0.0
        };
        self.release_coeff = if release_samples > 0.0 {
            (-1.0 / release_samples).exp()
        } else {
            0.0
        };
    }

    pub fn reset(&mut self) {
        self.envelope = [0.0; MAX_CHANNELS];
    }

    /// Process one interleaved block in place.
    pub fn process_block(&mut self, samples: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = samples.len() / channels;
        let threshold = self.threshold_db.tick_block(frames);
        let ratio = self.ratio.tick_block(frames).max(1.0);

        for frame in samples.chunks_exact_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                let env = &mut self.envelope[channel.min(MAX_CHANNELS - 1)];
                let rectified = sample.abs();
                let coeff = if rectified > *env {
                    self.attack_coeff
                } else {
                    self.release_coeff
                };
                *env = rectified + coeff * (*env - rectified);

                let level_db = linear_to_db(*env);
                let reduction_db = if level_db <= threshold {
                    0.0
                } else {
                    (threshold + (level_db - threshold) / ratio) - level_db
                };
                *sample *= db_to_linear(reduction_db);
            }
        }
    }
}
