//! Parameter automation
//!
//! Every live numeric change to a connected node travels as a ramp target:
//! the control side forwards the target value, the render side approaches it
//! exponentially over a fixed window (default 0.1 s). Values never step.
//! Structural changes are not ramped; they go through a graph rebuild.

use crossbeam_channel::{Sender, TrySendError};

use crate::chain::CompressorSettings;
use crate::dsp::effects::EffectSlots;
use crate::error::{DspError, Result};
use crate::render::{ProcessorUpdate, RenderCommand};

/// Default ramp window in seconds
pub const DEFAULT_RAMP_SECS: f32 = 0.1;

/// Threshold below which a ramp snaps to its target
const SETTLE_EPSILON: f32 = 1.0e-5;

/// A value that approaches its target exponentially, one-pole style.
///
/// `tick` advances one sample; `tick_block` advances a whole block in one
/// step (the closed form of `n` ticks), which is how block processors avoid
/// per-sample smoothing cost for slow parameters.
#[derive(Debug, Clone, Copy)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
    ramp_secs: f32,
    sample_rate: f32,
}

impl SmoothedParam {
    pub fn new(value: f32, sample_rate: f32) -> Self {
        Self::with_ramp(value, sample_rate, DEFAULT_RAMP_SECS)
    }

    pub fn with_ramp(value: f32, sample_rate: f32, ramp_secs: f32) -> Self {
        let mut param = Self {
            current: value,
            target: value,
            coeff: 0.0,
            ramp_secs,
            sample_rate,
        };
        param.update_coeff();
        param
    }

    fn update_coeff(&mut self) {
        let samples = self.ramp_secs * self.sample_rate;
        self.coeff = if samples > 0.0 {
            (-1.0 / samples).exp()
        } else {
            0.0
        };
    }

    /// Begin a ramp toward `target`. A new target supersedes any ramp in
    /// flight; there is no cancellation concept.
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump immediately, bypassing the ramp. Used when (re)building a graph,
    /// where the node was never audible at the old value.
    pub fn snap_to(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    pub fn set_ramp_secs(&mut self, ramp_secs: f32) {
        self.ramp_secs = ramp_secs.max(0.0);
        self.update_coeff();
    }

    /// Advance one sample and return the new value.
    #[inline]
    pub fn tick(&mut self) -> f32 {
        self.current = self.target + (self.current - self.target) * self.coeff;
        if (self.current - self.target).abs() < SETTLE_EPSILON {
            self.current = self.target;
        }
        self.current
    }

    /// Advance `samples` samples in one step and return the new value.
    #[inline]
    pub fn tick_block(&mut self, samples: usize) -> f32 {
        if self.current != self.target {
            let decay = self.coeff.powi(samples as i32);
            self.current = self.target + (self.current - self.target) * decay;
            if (self.current - self.target).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

/// Control-side half of parameter automation.
///
/// Wraps every live-value setter: targets are forwarded to the render path
/// over the command channel, where the matching `SmoothedParam` ramps them
/// in. The channel is bounded and drained every block, so `try_send` only
/// fails when the render side has stalled; that is surfaced as a backend
/// error rather than blocking the control thread.
#[derive(Debug)]
pub struct ParameterAutomator {
    tx: Sender<RenderCommand>,
    ramp_secs: f32,
}

impl ParameterAutomator {
    pub fn new(tx: Sender<RenderCommand>) -> Self {
        Self {
            tx,
            ramp_secs: DEFAULT_RAMP_SECS,
        }
    }

    /// Current ramp window in seconds
    pub fn ramp_secs(&self) -> f32 {
        self.ramp_secs
    }

    /// Change the ramp window for all subsequent ramps.
    pub fn set_ramp_secs(&mut self, ramp_secs: f32) -> Result<()> {
        self.ramp_secs = ramp_secs.max(0.0);
        self.send(RenderCommand::Update(ProcessorUpdate::RampWindow(
            self.ramp_secs,
        )))
    }

    pub fn ramp_band_gain(&self, index: usize, gain_db: f32) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::BandGain {
            index,
            gain_db,
        }))
    }

    pub fn set_equalizer_enabled(&self, enabled: bool) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::EqualizerEnabled(
            enabled,
        )))
    }

    /// Forward effective compressor settings (bypass already folded in).
    pub fn ramp_compressor(&self, settings: CompressorSettings) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::Compressor(settings)))
    }

    pub fn ramp_master_volume(&self, volume: f32) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::MasterVolume(volume)))
    }

    pub fn publish_effect_slots(&self, slots: EffectSlots) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::Effects(slots)))
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::Enabled(enabled)))
    }

    pub fn set_processing(&self, processing: bool) -> Result<()> {
        self.send(RenderCommand::Update(ProcessorUpdate::Processing(
            processing,
        )))
    }

    /// Publish a freshly built graph. Not ramped: structural changes swap
    /// whole node sets at a block boundary.
    pub fn publish_graph(&self, command: RenderCommand) -> Result<()> {
        self.send(command)
    }

    fn send(&self, command: RenderCommand) -> Result<()> {
        self.tx.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => DspError::Backend {
                reason: "render command queue is full".to_string(),
            },
            TrySendError::Disconnected(_) => DspError::Backend {
                reason: "render side has shut down".to_string(),
            },
        })
    }
}
