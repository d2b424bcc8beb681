//! Render path
//!
//! Everything in this module runs on the audio callback side. The contract
//! is strict: `process_block` never blocks, never allocates, and never
//! touches a lock. Control-side changes arrive over a bounded command
//! channel and are drained with `try_recv` at block boundaries only.
//!
//! Two interchangeable backends sit behind the same block interface. The
//! canonical one runs true biquad band filters and the envelope compressor.
//! The fallback is a deliberately low-fidelity approximation (broadband
//! linear gain per band, no filter curves) for hosts where the full graph
//! cannot run; it trades accuracy for cost, not correctness of the API.

use crossbeam_channel::{Receiver, Sender};

use crate::analysis::TapNode;
use crate::chain::{CompressorSettings, EqualizerBand, FilterKind, ProcessingChain, BAND_COUNT};
use crate::dsp::{
    BiquadCoeffs, BiquadState, CompressorNode, DynamicsStage, EffectSlots, SmoothedParam,
    MAX_CHANNELS,
};

/// Gain drift (dB) before a band recomputes its filter coefficients
const COEFF_RECALC_EPSILON: f32 = 1.0e-3;

/// Live-value retarget for the running processors. Each variant maps to a
/// `SmoothedParam` (or a flag) on the render side; none of them change the
/// graph's structure.
#[derive(Debug, Clone, Copy)]
pub enum ProcessorUpdate {
    /// Ramp window in seconds for all subsequent ramps
    RampWindow(f32),
    /// Retarget one equalizer band's gain
    BandGain { index: usize, gain_db: f32 },
    EqualizerEnabled(bool),
    /// Effective compressor settings, bypass already folded in
    Compressor(CompressorSettings),
    MasterVolume(f32),
    /// Replace the resolved effect slot array wholesale
    Effects(EffectSlots),
    Enabled(bool),
    Processing(bool),
}

/// A control-to-render command. Structural swaps carry a whole prebuilt
/// backend so the render side only moves a pointer.
#[derive(Debug)]
pub enum RenderCommand {
    Update(ProcessorUpdate),
    SwapGraph(Box<ProcessorGraph>),
    SwapFallback(Box<FallbackChain>),
}

/// One equalizer band on the render side: a smoothed gain driving biquad
/// coefficients, with per-channel filter state.
#[derive(Debug, Clone)]
struct FilterNode {
    kind: FilterKind,
    frequency: f32,
    q: f32,
    gain_db: SmoothedParam,
    coeffs: BiquadCoeffs,
    states: [BiquadState; MAX_CHANNELS],
    applied_gain: f32,
    sample_rate: f32,
}

impl FilterNode {
    fn new(band: &EqualizerBand, sample_rate: f32) -> Self {
        let coeffs = BiquadCoeffs::calculate(
            band.kind,
            sample_rate as f64,
            band.frequency as f64,
            band.gain as f64,
            band.q as f64,
        );
        Self {
            kind: band.kind,
            frequency: band.frequency,
            q: band.q,
            gain_db: SmoothedParam::new(band.gain, sample_rate),
            coeffs,
            states: [BiquadState::default(); MAX_CHANNELS],
            applied_gain: band.gain,
            sample_rate,
        }
    }

    fn process_block(&mut self, samples: &mut [f32], channels: usize) {
        let frames = samples.len() / channels;
        let gain = self.gain_db.tick_block(frames);

        // During a ramp the coefficients follow the smoothed gain once per
        // block; a block is short enough that this stays inaudible.
        if (gain - self.applied_gain).abs() > COEFF_RECALC_EPSILON {
            self.coeffs = BiquadCoeffs::calculate(
                self.kind,
                self.sample_rate as f64,
                self.frequency as f64,
                gain as f64,
                self.q as f64,
            );
            self.applied_gain = gain;
        }

        for frame in samples.chunks_exact_mut(channels) {
            for (channel, sample) in frame.iter_mut().enumerate() {
                let state = &mut self.states[channel.min(MAX_CHANNELS - 1)];
                *sample = state.process(*sample as f64, &self.coeffs) as f32;
            }
        }
    }
}

/// Canonical render backend: biquad band filters in series, then the
/// envelope compressor. Built whole on the control thread and swapped in at
/// a block boundary.
#[derive(Debug)]
pub struct ProcessorGraph {
    bands: Vec<FilterNode>,
    eq_enabled: bool,
    compressor: CompressorNode,
}

impl ProcessorGraph {
    pub fn new(chain: &ProcessingChain, sample_rate: f32) -> Self {
        let mut stage = DynamicsStage::new();
        stage.apply_settings(&chain.compressor);
        stage.set_enabled(chain.compressor.enabled);
        Self {
            bands: chain
                .equalizer
                .bands
                .iter()
                .map(|band| FilterNode::new(band, sample_rate))
                .collect(),
            eq_enabled: chain.equalizer.enabled,
            compressor: CompressorNode::new(stage.effective(), sample_rate),
        }
    }

    fn set_band_gain(&mut self, index: usize, gain_db: f32) {
        if let Some(band) = self.bands.get_mut(index) {
            band.gain_db.set_target(gain_db);
        }
    }

    fn set_ramp_secs(&mut self, ramp_secs: f32) {
        for band in &mut self.bands {
            band.gain_db.set_ramp_secs(ramp_secs);
        }
        self.compressor.set_ramp_secs(ramp_secs);
    }

    fn process_block(&mut self, samples: &mut [f32], channels: usize) {
        if self.eq_enabled {
            for band in &mut self.bands {
                band.process_block(samples, channels);
            }
        }
        self.compressor.process_block(samples, channels);
    }
}

/// Low-fidelity render backend. Each band contributes its linear gain
/// broadband (no filter curves), so the combined factor is the product of
/// the per-band gains; the compressor and ramping behave exactly like the
/// canonical backend.
#[derive(Debug)]
pub struct FallbackChain {
    band_gains_db: [SmoothedParam; BAND_COUNT],
    eq_enabled: bool,
    compressor: CompressorNode,
}

impl FallbackChain {
    pub fn new(chain: &ProcessingChain, sample_rate: f32) -> Self {
        let mut stage = DynamicsStage::new();
        stage.apply_settings(&chain.compressor);
        stage.set_enabled(chain.compressor.enabled);

        let mut band_gains_db = [SmoothedParam::new(0.0, sample_rate); BAND_COUNT];
        for (param, band) in band_gains_db.iter_mut().zip(&chain.equalizer.bands) {
            param.snap_to(band.gain);
        }
        Self {
            band_gains_db,
            eq_enabled: chain.equalizer.enabled,
            compressor: CompressorNode::new(stage.effective(), sample_rate),
        }
    }

    fn set_band_gain(&mut self, index: usize, gain_db: f32) {
        if let Some(param) = self.band_gains_db.get_mut(index) {
            param.set_target(gain_db);
        }
    }

    fn set_ramp_secs(&mut self, ramp_secs: f32) {
        for param in &mut self.band_gains_db {
            param.set_ramp_secs(ramp_secs);
        }
        self.compressor.set_ramp_secs(ramp_secs);
    }

    fn process_block(&mut self, samples: &mut [f32], channels: usize) {
        if self.eq_enabled {
            let frames = samples.len() / channels;
            let total_db = self
                .band_gains_db
                .iter_mut()
                .map(|p| p.tick_block(frames))
                .sum::<f32>();
            let factor = 10.0_f32.powf(total_db / 20.0);
            for sample in samples.iter_mut() {
                *sample *= factor;
            }
        }
        self.compressor.process_block(samples, channels);
    }
}

#[derive(Debug)]
enum Backend {
    Graph(Box<ProcessorGraph>),
    Fallback(Box<FallbackChain>),
}

/// A backend taken out of service by a swap. Opaque: the control side only
/// ever drops it, which is the point; the retired processors (and their
/// heap storage) must not be freed on the audio thread.
#[derive(Debug)]
pub struct RetiredBackend {
    _backend: Backend,
}

/// The render side of the engine. Owns one backend, the resolved effect
/// slots, master gain, and the analysis tap; drains the command channel at
/// every block boundary.
#[derive(Debug)]
pub struct ChainRenderer {
    rx: Receiver<RenderCommand>,
    retire_tx: Sender<RetiredBackend>,
    backend: Backend,
    effects: EffectSlots,
    master: SmoothedParam,
    tap: TapNode,
    enabled: bool,
    processing: bool,
}

impl ChainRenderer {
    pub fn new(
        rx: Receiver<RenderCommand>,
        retire_tx: Sender<RetiredBackend>,
        tap: TapNode,
        chain: &ProcessingChain,
        sample_rate: f32,
    ) -> Self {
        Self {
            rx,
            retire_tx,
            backend: Backend::Graph(Box::new(ProcessorGraph::new(chain, sample_rate))),
            effects: EffectSlots::default(),
            master: SmoothedParam::new(chain.master_volume, sample_rate),
            tap,
            enabled: true,
            processing: false,
        }
    }

    fn apply(&mut self, update: ProcessorUpdate) {
        match update {
            ProcessorUpdate::RampWindow(ramp_secs) => {
                self.master.set_ramp_secs(ramp_secs);
                match &mut self.backend {
                    Backend::Graph(graph) => graph.set_ramp_secs(ramp_secs),
                    Backend::Fallback(fallback) => fallback.set_ramp_secs(ramp_secs),
                }
            }
            ProcessorUpdate::BandGain { index, gain_db } => match &mut self.backend {
                Backend::Graph(graph) => graph.set_band_gain(index, gain_db),
                Backend::Fallback(fallback) => fallback.set_band_gain(index, gain_db),
            },
            ProcessorUpdate::EqualizerEnabled(enabled) => match &mut self.backend {
                Backend::Graph(graph) => graph.eq_enabled = enabled,
                Backend::Fallback(fallback) => fallback.eq_enabled = enabled,
            },
            ProcessorUpdate::Compressor(settings) => match &mut self.backend {
                Backend::Graph(graph) => graph.compressor.apply(settings),
                Backend::Fallback(fallback) => fallback.compressor.apply(settings),
            },
            ProcessorUpdate::MasterVolume(volume) => self.master.set_target(volume),
            ProcessorUpdate::Effects(slots) => self.effects = slots,
            ProcessorUpdate::Enabled(enabled) => self.enabled = enabled,
            ProcessorUpdate::Processing(processing) => self.processing = processing,
        }
    }

    /// Drain pending commands without blocking. A disconnected channel means
    /// the control side is gone; the renderer keeps running on its last
    /// state.
    fn drain(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            match command {
                RenderCommand::Update(update) => self.apply(update),
                RenderCommand::SwapGraph(graph) => self.swap(Backend::Graph(graph)),
                RenderCommand::SwapFallback(fallback) => {
                    self.swap(Backend::Fallback(fallback))
                }
            }
        }
    }

    /// Install a new backend without freeing the old one here: the retired
    /// processors own heap storage, and dropping that on the audio thread
    /// would break the allocation-free contract. They travel back to the
    /// control side instead, which drops them at its leisure.
    fn swap(&mut self, next: Backend) {
        let retired = std::mem::replace(&mut self.backend, next);
        // Only fails if the control side stopped reclaiming; dropping
        // inline is then the remaining option.
        let _ = self.retire_tx.try_send(RetiredBackend { _backend: retired });
    }

    /// Process one interleaved block in place. Pass-through (buffer
    /// untouched) while the engine is disabled or processing is stopped.
    pub fn process_block(&mut self, samples: &mut [f32], channels: usize) {
        self.drain();
        if channels == 0 || !self.enabled || !self.processing {
            return;
        }

        match &mut self.backend {
            Backend::Graph(graph) => graph.process_block(samples, channels),
            Backend::Fallback(fallback) => fallback.process_block(samples, channels),
        }

        if !self.effects.is_empty() {
            for sample in samples.iter_mut() {
                *sample = self.effects.process(*sample);
            }
        }

        let frames = samples.len() / channels;
        let volume = self.master.tick_block(frames);
        for sample in samples.iter_mut() {
            *sample *= volume;
        }

        self.tap.push_block(samples, channels);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analysis_pair;
    use crate::dsp::EffectRegistry;
    use approx::assert_relative_eq;
    use crossbeam_channel::Sender;

    const SR: f32 = 48000.0;

    fn renderer(
        chain: &ProcessingChain,
    ) -> (
        ChainRenderer,
        Sender<RenderCommand>,
        Receiver<RetiredBackend>,
    ) {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let (retire_tx, retire_rx) = crossbeam_channel::bounded(64);
        let (tap, _analysis) = analysis_pair();
        let mut renderer = ChainRenderer::new(rx, retire_tx, tap, chain, SR);
        renderer.processing = true;
        (renderer, tx, retire_rx)
    }

    fn ones(frames: usize) -> Vec<f32> {
        vec![1.0; frames * 2]
    }

    #[test]
    fn test_pass_through_when_not_processing() {
        let chain = ProcessingChain::default();
        let (mut r, _tx, _retired) = renderer(&chain);
        r.processing = false;

        let mut block = ones(256);
        r.process_block(&mut block, 2);
        assert!(block.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_pass_through_when_disabled() {
        let chain = ProcessingChain::default();
        let (mut r, tx, _retired) = renderer(&chain);
        tx.send(RenderCommand::Update(ProcessorUpdate::Enabled(false)))
            .unwrap();

        let mut block = ones(256);
        r.process_block(&mut block, 2);
        assert!(block.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_flat_chain_applies_master_volume() {
        // Flat EQ at 0 dB is transparent, so output settles at the 0.8
        // master baseline.
        let chain = ProcessingChain::default();
        let (mut r, _tx, _retired) = renderer(&chain);

        let mut block = ones(4096);
        for _ in 0..8 {
            block.fill(1.0);
            r.process_block(&mut block, 2);
        }
        let tail = block[block.len() - 1];
        assert_relative_eq!(tail, 0.8, epsilon = 0.02);
    }

    #[test]
    fn test_master_volume_ramps_to_new_target() {
        let chain = ProcessingChain::default();
        let (mut r, tx, _retired) = renderer(&chain);
        tx.send(RenderCommand::Update(ProcessorUpdate::MasterVolume(0.0)))
            .unwrap();

        // 0.1 s ramp at 48 kHz: over a second of audio is far past settled.
        let mut block = ones(4096);
        for _ in 0..30 {
            block.fill(1.0);
            r.process_block(&mut block, 2);
        }
        assert!(block[block.len() - 1].abs() < 1.0e-3);
    }

    #[test]
    fn test_effect_slots_are_applied() {
        let mut chain = ProcessingChain::default();
        chain.master_volume = 1.0;
        let (mut r, tx, _retired) = renderer(&chain);

        let mut registry = EffectRegistry::with_defaults();
        assert!(registry.set_enabled("bass-boost", true));
        tx.send(RenderCommand::Update(ProcessorUpdate::Effects(
            registry.resolve_slots(),
        )))
        .unwrap();
        tx.send(RenderCommand::Update(ProcessorUpdate::EqualizerEnabled(
            false,
        )))
        .unwrap();

        let mut block = vec![0.5f32; 512];
        for _ in 0..8 {
            block.fill(0.5);
            r.process_block(&mut block, 2);
        }
        // bass-boost at amount 50 is a flat 1.5x
        assert_relative_eq!(block[block.len() - 1], 0.75, epsilon = 0.01);
    }

    #[test]
    fn test_band_gain_update_boosts_output() {
        let mut chain = ProcessingChain::default();
        chain.master_volume = 1.0;
        chain.compressor.enabled = false;
        let (mut r, tx, _retired) = renderer(&chain);

        for index in 0..BAND_COUNT {
            tx.send(RenderCommand::Update(ProcessorUpdate::BandGain {
                index,
                gain_db: 6.0,
            }))
            .unwrap();
        }

        // 500 Hz sine through every band boosted 6 dB must come out louder.
        let sine = |i: usize| (2.0 * std::f32::consts::PI * 500.0 * (i / 2) as f32 / SR).sin();
        let mut block: Vec<f32> = (0..8192).map(sine).collect();
        for _ in 0..12 {
            for (i, s) in block.iter_mut().enumerate() {
                *s = sine(i);
            }
            r.process_block(&mut block, 2);
        }
        let rms = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();
        let input_rms = (0.5f32).sqrt();
        assert!(rms > input_rms * 1.3, "expected boost, rms {rms}");
    }

    #[test]
    fn test_fallback_swap_keeps_api() {
        let mut chain = ProcessingChain::default();
        chain.master_volume = 1.0;
        chain.equalizer.bands[0].gain = 20.0;
        let (mut r, tx, _retired) = renderer(&chain);
        tx.send(RenderCommand::SwapFallback(Box::new(FallbackChain::new(
            &chain, SR,
        ))))
        .unwrap();

        // One band at +20 dB is a broadband 10x in the fallback; the
        // compressor is off by default so nothing pulls it back.
        let mut block = vec![0.05f32; 1024];
        for _ in 0..8 {
            block.fill(0.05);
            r.process_block(&mut block, 2);
        }
        assert_relative_eq!(block[block.len() - 1], 0.5, epsilon = 0.02);
    }

    #[test]
    fn test_graph_swap_replaces_state() {
        let chain = ProcessingChain::default();
        let (mut r, tx, _retired) = renderer(&chain);

        let mut boosted = ProcessingChain::default();
        boosted.master_volume = 1.0;
        for band in &mut boosted.equalizer.bands {
            band.gain = 0.0;
        }
        tx.send(RenderCommand::SwapGraph(Box::new(ProcessorGraph::new(
            &boosted, SR,
        ))))
        .unwrap();
        // The swapped graph has no master override; master stays at the
        // renderer and still ramps from the old chain's 0.8.
        let mut block = ones(2048);
        r.process_block(&mut block, 2);
        assert!(block[block.len() - 1] < 1.0);
    }

    #[test]
    fn test_swap_returns_retired_backend_to_control_side() {
        let chain = ProcessingChain::default();
        let (mut r, tx, retired) = renderer(&chain);

        tx.send(RenderCommand::SwapFallback(Box::new(FallbackChain::new(
            &chain, SR,
        ))))
        .unwrap();
        tx.send(RenderCommand::SwapGraph(Box::new(ProcessorGraph::new(
            &chain, SR,
        ))))
        .unwrap();

        let mut block = ones(64);
        r.process_block(&mut block, 2);

        // Both replaced backends travel back whole; their heap storage is
        // freed on the receiving side, never inside the callback.
        assert_eq!(retired.try_iter().count(), 2);
    }

    #[test]
    fn test_zero_channels_is_a_no_op() {
        let chain = ProcessingChain::default();
        let (mut r, _tx, _retired) = renderer(&chain);

        let mut block = ones(16);
        r.process_block(&mut block, 0);
        assert!(block.iter().all(|&s| s == 1.0));
    }

    #[test]
    fn test_disconnected_control_side_keeps_running() {
        let chain = ProcessingChain::default();
        let (mut r, tx, _retired) = renderer(&chain);
        drop(tx);

        let mut block = ones(512);
        r.process_block(&mut block, 2);
        // Still processing on last known state, no panic, no block.
        assert!(block.iter().all(|s| s.is_finite()));
    }
}
