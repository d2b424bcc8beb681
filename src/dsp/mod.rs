//! DSP building blocks
//!
//! Stage state (equalizer, dynamics, effects) lives here together with the
//! numeric primitives the render path runs: biquad filters, the envelope
//! compressor, and parameter smoothing.

mod automation;
mod biquad;
mod dynamics;
mod effects;
mod equalizer;

pub use automation::{ParameterAutomator, SmoothedParam, DEFAULT_RAMP_SECS};
pub use biquad::{BiquadCoeffs, BiquadState};
pub use dynamics::{CompressorNode, DynamicsStage};
pub use effects::{AudioEffect, EffectKind, EffectRegistry, EffectSlot, EffectSlots, MAX_EFFECT_SLOTS};
pub use equalizer::{curve_names, gain_curve, EqualizerStage, GAIN_CURVES};

/// Maximum channel count the render nodes carry state for.
pub const MAX_CHANNELS: usize = 2;
