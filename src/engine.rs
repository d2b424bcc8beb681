//! Engine facade
//!
//! `DspEngine` is the control-side owner of everything: stage state, the
//! graph builder, the preset store, the effect registry, and the event bus.
//! The host constructs one engine per output context, initializes it with
//! the context's sample rate, takes the `ChainRenderer` into its audio
//! callback, and drives all further changes through the methods here.
//!
//! Every mutation follows the same shape: update the control-side stage
//! first, then forward the live values to the render path as ramp targets.
//! Backend send failures are returned to the caller and mirrored on the
//! event bus as `Error` events.

use crossbeam_channel::Receiver;
use tracing::{debug, info, warn};

use crate::analysis::{analysis_pair, AnalysisTap};
use crate::chain::{CompressorSettings, EngineState, ProcessingChain, BAND_COUNT};
use crate::dsp::{
    AudioEffect, DynamicsStage, EffectRegistry, EqualizerStage, ParameterAutomator,
};
use crate::error::{DspError, Result};
use crate::events::{EngineEvent, EventBus};
use crate::graph::{AudioGraphBuilder, GraphTopology, NodeKind};
use crate::presets::PresetStore;
use crate::render::{
    ChainRenderer, FallbackChain, ProcessorGraph, RenderCommand, RetiredBackend,
};

/// Capacity of the control-to-render command channel. Sized so a full
/// chain apply plus a graph swap fits many times over between blocks.
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Capacity of the channel carrying retired render backends back to the
/// control thread for dropping.
const RETIRE_QUEUE_CAPACITY: usize = 16;

/// Engine lifecycle. `Shutdown` is terminal; a fresh engine is required
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Uninitialized,
    Ready,
    Rebuilding,
    Shutdown,
}

/// The signal-processing engine's control surface.
pub struct DspEngine {
    lifecycle: Lifecycle,
    sample_rate: f32,
    graph: Option<AudioGraphBuilder>,
    automator: Option<ParameterAutomator>,
    renderer: Option<ChainRenderer>,
    analysis: Option<AnalysisTap>,
    retired: Option<Receiver<RetiredBackend>>,
    equalizer: EqualizerStage,
    dynamics: DynamicsStage,
    effects: EffectRegistry,
    master_volume: f32,
    enabled: bool,
    processing: bool,
    presets: PresetStore,
    events: EventBus,
}

impl Default for DspEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DspEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DspEngine")
            .field("lifecycle", &self.lifecycle)
            .field("sample_rate", &self.sample_rate)
            .field("enabled", &self.enabled)
            .field("processing", &self.processing)
            .finish()
    }
}

impl DspEngine {
    /// A fresh engine: built-in effects registered (disabled), built-in
    /// presets loaded, no backend yet.
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Uninitialized,
            sample_rate: 0.0,
            graph: None,
            automator: None,
            renderer: None,
            analysis: None,
            retired: None,
            equalizer: EqualizerStage::new(),
            dynamics: DynamicsStage::new(),
            effects: EffectRegistry::with_defaults(),
            master_volume: ProcessingChain::default().master_volume,
            enabled: true,
            processing: false,
            presets: PresetStore::with_builtins(),
            events: EventBus::new(),
        }
    }

    /// Bring up the backend context and build the initial graph.
    ///
    /// Idempotent while the engine is alive: a second call on a ready
    /// engine is a no-op. After `shutdown` the engine cannot come back.
    pub fn initialize(&mut self, sample_rate_hz: f32) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Rebuilding => {
                debug!("initialize skipped: engine already running");
                return Ok(());
            }
            Lifecycle::Shutdown => {
                return Err(self.report(DspError::EngineInit {
                    reason: "engine has been shut down".to_string(),
                }));
            }
            Lifecycle::Uninitialized => {}
        }

        let mut graph = AudioGraphBuilder::new(sample_rate_hz).map_err(|e| self.report(e))?;
        let chain = self.chain();
        graph.rebuild_graph(&chain);

        let (tx, rx) = crossbeam_channel::bounded(COMMAND_QUEUE_CAPACITY);
        let (retire_tx, retire_rx) = crossbeam_channel::bounded(RETIRE_QUEUE_CAPACITY);
        let (tap, analysis) = analysis_pair();

        self.renderer = Some(ChainRenderer::new(rx, retire_tx, tap, &chain, sample_rate_hz));
        self.analysis = Some(analysis);
        self.retired = Some(retire_rx);
        self.automator = Some(ParameterAutomator::new(tx));
        self.graph = Some(graph);
        self.sample_rate = sample_rate_hz;
        self.lifecycle = Lifecycle::Ready;

        info!(sample_rate = sample_rate_hz, "engine initialized");
        self.events.emit(&EngineEvent::Initialized);
        Ok(())
    }

    /// Hand the render half to the audio callback. Available exactly once
    /// per initialization.
    pub fn take_renderer(&mut self) -> Option<ChainRenderer> {
        self.renderer.take()
    }

    /// The analysis consumer, while the engine holds it.
    pub fn analysis_mut(&mut self) -> Option<&mut AnalysisTap> {
        self.analysis.as_mut()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Register an observer for engine events.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        self.events.subscribe(listener);
    }

    /// Snapshot of the committed chain, assembled from stage state.
    pub fn chain(&self) -> ProcessingChain {
        ProcessingChain {
            equalizer: self.equalizer.section(),
            compressor: self.dynamics.settings(),
            master_volume: self.master_volume,
        }
    }

    /// Engine status snapshot for the host.
    pub fn state(&self) -> EngineState {
        EngineState {
            enabled: self.enabled,
            processing: self.processing,
            active_effect_ids: self.effects.active_ids(),
        }
    }

    /// Commit a full chain descriptor atomically. Validation happens before
    /// anything is touched: a rejected chain leaves the engine exactly as
    /// it was. Ranged values are clamped, not rejected.
    pub fn apply_chain(&mut self, chain: ProcessingChain) -> Result<()> {
        self.ensure_ready()?;
        chain.validate().map_err(|e| self.report(e))?;

        let mut chain = chain;
        chain.clamp();

        self.equalizer.apply_section(&chain.equalizer);
        self.dynamics.apply_settings(&chain.compressor);
        self.master_volume = chain.master_volume;

        self.ramp_equalizer()?;
        self.ramp_compressor()?;
        self.checked(|a| a.ramp_master_volume(chain.master_volume))?;

        self.events.emit(&EngineEvent::ChainUpdated(chain));
        Ok(())
    }

    /// Commit a chain arriving as untyped JSON (the transport boundary).
    pub fn apply_chain_value(&mut self, value: serde_json::Value) -> Result<()> {
        let chain = ProcessingChain::from_value(value).map_err(|e| self.report(e))?;
        self.apply_chain(chain)
    }

    /// Tear down and rewire the node graph from the committed chain, then
    /// swap a freshly built processor set into the render path. Safe to
    /// call repeatedly; the resulting topology converges.
    pub fn rebuild_graph(&mut self) -> Result<GraphTopology> {
        self.ensure_ready()?;
        self.reclaim_retired();
        self.lifecycle = Lifecycle::Rebuilding;

        let chain = self.chain();
        let topology = match self.graph.as_mut() {
            Some(graph) => graph.rebuild_graph(&chain),
            None => {
                self.lifecycle = Lifecycle::Ready;
                return Err(self.report(DspError::Backend {
                    reason: "graph builder is missing".to_string(),
                }));
            }
        };

        let processors = ProcessorGraph::new(&chain, self.sample_rate);
        let result = self.checked(|a| a.publish_graph(RenderCommand::SwapGraph(Box::new(processors))));
        self.lifecycle = Lifecycle::Ready;
        result?;

        debug!(connections = topology.connection_count(), "graph rebuilt");
        Ok(topology)
    }

    /// Switch the render backend. The canonical graph backend runs true
    /// band filters; the fallback trades filter curves for a cheap
    /// broadband approximation on constrained hosts. The control surface
    /// is identical either way.
    pub fn set_fallback_backend(&mut self, fallback: bool) -> Result<()> {
        self.ensure_ready()?;
        self.reclaim_retired();
        let chain = self.chain();
        let sample_rate = self.sample_rate;
        let command = if fallback {
            RenderCommand::SwapFallback(Box::new(FallbackChain::new(&chain, sample_rate)))
        } else {
            RenderCommand::SwapGraph(Box::new(ProcessorGraph::new(&chain, sample_rate)))
        };
        self.checked(|a| a.publish_graph(command))
    }

    /// Where sources connect: the head of the current graph.
    pub fn input_destination(&self) -> Option<NodeKind> {
        self.graph.as_ref().map(|g| g.input_destination_kind())
    }

    // ---- equalizer ----

    /// Set one band's gain (clamped to ±20 dB) and ramp the live filter.
    /// Returns the stored value.
    pub fn set_band(&mut self, index: usize, gain_db: f32) -> Result<f32> {
        self.ensure_ready()?;
        let stored = match self.equalizer.set_band(index, gain_db) {
            Some(stored) => stored,
            None => {
                return Err(self.report(DspError::InvalidChain {
                    reason: format!("band index {index} out of range"),
                }))
            }
        };
        self.checked(|a| a.ramp_band_gain(index, stored))?;
        self.emit_equalizer_change();
        Ok(stored)
    }

    /// All ten gains back to 0 dB.
    pub fn reset_equalizer(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.equalizer.reset();
        self.ramp_equalizer()?;
        self.emit_equalizer_change();
        Ok(())
    }

    pub fn set_equalizer_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_ready()?;
        self.equalizer.set_enabled(enabled);
        self.checked(|a| a.set_equalizer_enabled(enabled))
    }

    /// Load a named gain curve (e.g. "rock", "full-bass") into the bands.
    pub fn load_equalizer_preset(&mut self, name: &str) -> Result<[f32; BAND_COUNT]> {
        self.ensure_ready()?;
        let gains = self.equalizer.load_curve(name).map_err(|e| self.report(e))?;
        self.ramp_equalizer()?;
        self.emit_equalizer_change();
        Ok(gains)
    }

    pub fn band_gains(&self) -> [f32; BAND_COUNT] {
        self.equalizer.gains()
    }

    fn ramp_equalizer(&mut self) -> Result<()> {
        let gains = self.equalizer.gains();
        let enabled = self.equalizer.is_enabled();
        self.checked(|a| {
            for (index, &gain) in gains.iter().enumerate() {
                a.ramp_band_gain(index, gain)?;
            }
            a.set_equalizer_enabled(enabled)
        })
    }

    fn emit_equalizer_change(&self) {
        self.events
            .emit(&EngineEvent::EqualizerChange(self.equalizer.bands().to_vec()));
    }

    // ---- compressor ----

    pub fn set_compressor_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_ready()?;
        self.dynamics.set_enabled(enabled);
        self.ramp_compressor()
    }

    pub fn set_compressor_threshold(&mut self, threshold_db: f32) -> Result<()> {
        self.ensure_ready()?;
        self.dynamics.set_threshold(threshold_db);
        self.ramp_compressor()
    }

    pub fn set_compressor_ratio(&mut self, ratio: f32) -> Result<()> {
        self.ensure_ready()?;
        self.dynamics.set_ratio(ratio);
        self.ramp_compressor()
    }

    pub fn set_compressor_attack(&mut self, attack_secs: f32) -> Result<()> {
        self.ensure_ready()?;
        self.dynamics.set_attack(attack_secs);
        self.ramp_compressor()
    }

    pub fn set_compressor_release(&mut self, release_secs: f32) -> Result<()> {
        self.ensure_ready()?;
        self.dynamics.set_release(release_secs);
        self.ramp_compressor()
    }

    pub fn compressor_settings(&self) -> CompressorSettings {
        self.dynamics.settings()
    }

    /// Forward the effective settings; bypass is folded in here so the
    /// live node never disconnects.
    fn ramp_compressor(&mut self) -> Result<()> {
        let effective = self.dynamics.effective();
        self.checked(|a| a.ramp_compressor(effective))
    }

    // ---- effects ----

    /// Register (or replace) an effect. New effects start wherever their
    /// `enabled` flag says; the slot array is republished either way.
    pub fn register_effect(&mut self, effect: AudioEffect) -> Result<()> {
        self.ensure_ready()?;
        let id = effect.id.clone();
        self.effects.register(effect);
        self.publish_effects()?;
        self.events.emit(&EngineEvent::EffectRegistered { id });
        Ok(())
    }

    /// Remove an effect from the registry. Unknown ids are a no-op.
    pub fn unregister_effect(&mut self, id: &str) -> Result<Option<AudioEffect>> {
        self.ensure_ready()?;
        let removed = self.effects.unregister(id);
        if removed.is_some() {
            self.publish_effects()?;
        }
        Ok(removed)
    }

    /// Flip an effect's enable flag. Returns `false` (without touching the
    /// render path) when the id is unknown.
    pub fn set_effect_enabled(&mut self, id: &str, enabled: bool) -> Result<bool> {
        self.ensure_ready()?;
        if !self.effects.set_enabled(id, enabled) {
            warn!(id, "effect toggle ignored: unknown id");
            return Ok(false);
        }
        self.publish_effects()?;
        self.events.emit(&EngineEvent::EffectChange {
            id: id.to_string(),
            enabled,
        });
        Ok(true)
    }

    /// Update one effect parameter. Returns `false` for unknown ids.
    pub fn set_effect_param(&mut self, id: &str, key: &str, value: f32) -> Result<bool> {
        self.ensure_ready()?;
        if !self.effects.set_param(id, key, value) {
            return Ok(false);
        }
        self.publish_effects()?;
        Ok(true)
    }

    pub fn effect(&self, id: &str) -> Option<&AudioEffect> {
        self.effects.get(id)
    }

    pub fn active_effect_ids(&self) -> Vec<String> {
        self.effects.active_ids()
    }

    /// Resolve the registry into the fixed slot array and push it to the
    /// render path. Resolution happens here, on the control thread; the
    /// render path only walks the array.
    fn publish_effects(&mut self) -> Result<()> {
        let slots = self.effects.resolve_slots();
        self.checked(|a| a.publish_effect_slots(slots))
    }

    // ---- master / transport ----

    pub fn set_master_volume(&mut self, volume: f32) -> Result<()> {
        self.ensure_ready()?;
        self.master_volume = volume.clamp(0.0, 1.0);
        let volume = self.master_volume;
        self.checked(|a| a.ramp_master_volume(volume))
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Change the automation ramp window for all subsequent ramps.
    pub fn set_ramp_secs(&mut self, ramp_secs: f32) -> Result<()> {
        self.ensure_ready()?;
        let result = match self.automator.as_mut() {
            Some(automator) => automator.set_ramp_secs(ramp_secs),
            None => Err(DspError::Backend {
                reason: "automation channel is missing".to_string(),
            }),
        };
        result.map_err(|e| self.report(e))
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.ensure_ready()?;
        self.enabled = enabled;
        self.checked(|a| a.set_enabled(enabled))
    }

    pub fn start_processing(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if self.processing {
            return Ok(());
        }
        self.checked(|a| a.set_processing(true))?;
        self.processing = true;
        self.events.emit(&EngineEvent::ProcessingStart);
        Ok(())
    }

    pub fn stop_processing(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if !self.processing {
            return Ok(());
        }
        self.checked(|a| a.set_processing(false))?;
        self.processing = false;
        self.events.emit(&EngineEvent::ProcessingStop);
        Ok(())
    }

    // ---- presets ----

    pub fn preset_names(&self) -> Vec<String> {
        self.presets.preset_names()
    }

    /// Load a named preset and commit it as the active chain.
    pub fn load_preset(&mut self, name: &str) -> Result<()> {
        self.ensure_ready()?;
        let chain = self.presets.load(name).map_err(|e| self.report(e))?;
        self.apply_chain(chain)
    }

    /// Snapshot the committed chain under `name`, overwriting in place.
    pub fn save_preset(&mut self, name: &str) -> Result<()> {
        let chain = self.chain();
        self.presets.save(name, &chain).map_err(|e| self.report(e))
    }

    pub fn delete_preset(&mut self, name: &str) -> Result<ProcessingChain> {
        self.presets.remove(name).map_err(|e| self.report(e))
    }

    // ---- lifecycle ----

    /// Release the backend. Safe on an engine that never initialized, and
    /// idempotent. Terminal: the engine will not initialize again.
    pub fn shutdown(&mut self) {
        if self.lifecycle == Lifecycle::Shutdown {
            return;
        }
        if self.processing {
            // Best-effort stop; the channel may already be gone.
            if let Some(automator) = &self.automator {
                let _ = automator.set_processing(false);
            }
            self.processing = false;
            self.events.emit(&EngineEvent::ProcessingStop);
        }
        self.reclaim_retired();
        self.automator = None;
        self.graph = None;
        self.renderer = None;
        self.analysis = None;
        self.retired = None;
        self.lifecycle = Lifecycle::Shutdown;
        info!("engine shut down");
    }

    /// Drop backends the render side has swapped out. Retired processors
    /// own heap storage, so they are freed here on the control thread, not
    /// in the audio callback.
    fn reclaim_retired(&self) {
        if let Some(rx) = &self.retired {
            while rx.try_recv().is_ok() {}
        }
    }

    fn ensure_ready(&mut self) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Rebuilding => Ok(()),
            Lifecycle::Uninitialized => Err(self.report(DspError::Backend {
                reason: "engine is not initialized".to_string(),
            })),
            Lifecycle::Shutdown => Err(self.report(DspError::Backend {
                reason: "engine has been shut down".to_string(),
            })),
        }
    }

    /// Run an automator call, mirroring any failure on the event bus.
    fn checked<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&ParameterAutomator) -> Result<()>,
    {
        let result = match self.automator.as_ref() {
            Some(automator) => f(automator),
            None => Err(DspError::Backend {
                reason: "automation channel is missing".to_string(),
            }),
        };
        result.map_err(|e| self.report(e))
    }

    /// Mirror an error on the event bus before returning it.
    fn report(&self, error: DspError) -> DspError {
        warn!(code = error.error_code(), %error, "engine operation failed");
        self.events.emit(&EngineEvent::Error {
            code: error.error_code(),
            message: error.to_string(),
        });
        error
    }
}
