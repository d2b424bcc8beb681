//! Effect registry and the software-fallback effect path
//!
//! Effects are named units with an enable flag and a fixed set of numeric
//! parameters. The per-sample transfer functions are exact behavioral
//! contracts; see the table in the module tests.
//!
//! The render path never walks the registry: enabled effects are
//! pre-resolved into a fixed-capacity `EffectSlots` array on the control
//! thread whenever an enable flag or parameter changes, and the per-sample
//! loop iterates only that array.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum number of simultaneously active effects on the render path.
pub const MAX_EFFECT_SLOTS: usize = 8;

/// Ceiling applied by the night-mode limiter stage.
const NIGHT_MODE_CEILING: f32 = 0.9;

/// A pluggable named effect: id, display name, enable flag, and parameters
/// keyed by fixed per-id names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEffect {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub params: BTreeMap<String, f32>,
}

impl AudioEffect {
    pub fn new(id: &str, name: &str, params: &[(&str, f32)]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            enabled: false,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }
}

/// Built-in transfer functions, keyed by effect id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectKind {
    BassBoost,
    Surround,
    NightMode,
    VoiceEnhance,
    Reverb,
    /// Registered ids without a built-in transfer function pass audio
    /// through unchanged.
    #[default]
    Passthrough,
}

impl EffectKind {
    pub fn from_id(id: &str) -> Self {
        match id {
            "bass-boost" => EffectKind::BassBoost,
            "surround" => EffectKind::Surround,
            "night-mode" => EffectKind::NightMode,
            "voice-enhance" => EffectKind::VoiceEnhance,
            "reverb" => EffectKind::Reverb,
            _ => EffectKind::Passthrough,
        }
    }

    /// The parameter that drives this kind's transfer function.
    pub fn driving_param(&self) -> Option<&'static str> {
        match self {
            EffectKind::BassBoost => Some("amount"),
            EffectKind::Surround => Some("width"),
            EffectKind::NightMode => Some("compression"),
            EffectKind::VoiceEnhance => Some("clarity"),
            EffectKind::Reverb => Some("wet"),
            EffectKind::Passthrough => None,
        }
    }
}

/// One resolved, render-ready effect: kind plus its driving value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EffectSlot {
    pub kind: EffectKind,
    /// Driving parameter value, 0..=100
    pub value: f32,
}

impl EffectSlot {
    #[inline]
    pub fn process(&self, sample: f32) -> f32 {
        let v = self.value / 100.0;
        match self.kind {
            EffectKind::BassBoost => sample * (1.0 + v),
            EffectKind::Surround => sample * (1.0 + v * 0.3),
            EffectKind::NightMode => {
                let compressed = sample.abs().powf(1.0 - v * 0.5);
                sample.signum() * compressed.min(NIGHT_MODE_CEILING)
            }
            EffectKind::VoiceEnhance => sample * (1.0 + v * 0.2),
            EffectKind::Reverb => sample * (1.0 - v) + sample * v * 0.5,
            EffectKind::Passthrough => sample,
        }
    }
}

/// Fixed-capacity array of active effects, in registration order.
///
/// `Copy`, so it crosses the command channel without allocation and the
/// render callback can hold it by value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EffectSlots {
    slots: [EffectSlot; MAX_EFFECT_SLOTS],
    len: usize,
}

impl EffectSlots {
    pub fn push(&mut self, slot: EffectSlot) -> bool {
        if self.len == MAX_EFFECT_SLOTS {
            return false;
        }
        self.slots[self.len] = slot;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Apply every active effect to one sample, in order.
    #[inline]
    pub fn process(&self, sample: f32) -> f32 {
        let mut out = sample;
        for slot in &self.slots[..self.len] {
            out = slot.process(out);
        }
        out
    }
}

/// Registry of pluggable effects.
///
/// Keeps registration order, which is also processing order on the
/// software-fallback path.
#[derive(Debug, Clone, Default)]
pub struct EffectRegistry {
    effects: Vec<AudioEffect>,
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in effect set and its original
    /// default parameters.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(AudioEffect::new(
            "bass-boost",
            "Bass Boost",
            &[("amount", 50.0), ("frequency", 100.0)],
        ));
        registry.register(AudioEffect::new(
            "surround",
            "Surround Sound",
            &[("width", 75.0), ("delay", 20.0)],
        ));
        registry.register(AudioEffect::new(
            "night-mode",
            "Night Mode",
            &[("compression", 60.0), ("limit", -10.0)],
        ));
        registry.register(AudioEffect::new(
            "voice-enhance",
            "Voice Enhancement",
            &[("clarity", 50.0), ("presence", 30.0)],
        ));
        registry.register(AudioEffect::new(
            "reverb",
            "Reverb",
            &[("room", 30.0), ("damp", 50.0), ("wet", 25.0)],
        ));
        registry
    }

    /// Register an effect. Re-registering an existing id replaces it in
    /// place, keeping its position in processing order.
    pub fn register(&mut self, effect: AudioEffect) {
        match self.effects.iter_mut().find(|e| e.id == effect.id) {
            Some(existing) => *existing = effect,
            None => self.effects.push(effect),
        }
    }

    pub fn unregister(&mut self, id: &str) -> Option<AudioEffect> {
        let index = self.effects.iter().position(|e| e.id == id)?;
        Some(self.effects.remove(index))
    }

    pub fn get(&self, id: &str) -> Option<&AudioEffect> {
        self.effects.iter().find(|e| e.id == id)
    }

    /// Flip an effect's enable flag. Returns `false` for unknown ids.
    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> bool {
        match self.effects.iter_mut().find(|e| e.id == id) {
            Some(effect) => {
                effect.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Set one named parameter. Returns `false` for unknown ids; unknown
    /// keys are stored as-is (param keys are fixed per id by convention,
    /// not enforced here).
    pub fn set_param(&mut self, id: &str, key: &str, value: f32) -> bool {
        match self.effects.iter_mut().find(|e| e.id == id) {
            Some(effect) => {
                effect.params.insert(key.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn effects(&self) -> &[AudioEffect] {
        &self.effects
    }

    /// Ids of enabled effects, in registration order.
    pub fn active_ids(&self) -> Vec<String> {
        self.effects
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Pre-resolve enabled effects into the render-ready slot array.
    /// Called on the control thread whenever an enable flag or parameter
    /// changes, never from the per-sample loop.
    pub fn resolve_slots(&self) -> EffectSlots {
        let mut slots = EffectSlots::default();
        for effect in self.effects.iter().filter(|e| e.enabled) {
            let kind = EffectKind::from_id(&effect.id);
            let value = kind
                .driving_param()
                .and_then(|key| effect.params.get(key).copied())
                .unwrap_or(0.0);
            if !slots.push(EffectSlot { kind, value }) {
                break;
            }
        }
        slots
    }

    /// Apply all enabled effects to one sample (software fallback path).
    pub fn process(&self, sample: f32) -> f32 {
        self.resolve_slots().process(sample)
    }
}
