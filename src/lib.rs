//! Real-time audio signal-processing chain engine.
//!
//! A 10-band parametric equalizer, a dynamics compressor with click-free
//! bypass, a pluggable per-sample effect registry, and a master gain,
//! arranged as a rebuildable node graph with an analysis tap at the end.
//! Control and render halves are split: the [`DspEngine`] facade owns all
//! state on the control thread, while the [`ChainRenderer`] it hands out
//! processes audio without blocking, locking, or allocating. Live value
//! changes cross over as exponential ramp targets (0.1 s by default), so
//! nothing ever steps audibly.
//!
//! ```no_run
//! use resona::DspEngine;
//!
//! # fn main() -> resona::Result<()> {
//! let mut engine = DspEngine::new();
//! engine.initialize(48_000.0)?;
//! let mut renderer = engine.take_renderer().unwrap();
//!
//! engine.load_preset("Bass Boost")?;
//! engine.start_processing()?;
//!
//! // In the audio callback:
//! let mut block = vec![0.0f32; 1024];
//! renderer.process_block(&mut block, 2);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod chain;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod presets;
pub mod render;

pub use analysis::{AnalysisFrame, AnalysisTap, ANALYSIS_BINS, ANALYSIS_WINDOW};
pub use chain::{
    CompressorSettings, EngineState, EqualizerBand, EqualizerSection, FilterKind,
    ProcessingChain, BAND_COUNT, BAND_FREQUENCIES, MAX_BAND_GAIN_DB, MIN_BAND_GAIN_DB,
};
pub use dsp::{AudioEffect, EffectRegistry, DEFAULT_RAMP_SECS};
pub use engine::{DspEngine, Lifecycle};
pub use error::{DspError, Result};
pub use events::{EngineEvent, EventBus};
pub use graph::{AudioGraphBuilder, GraphTopology, NodeKind};
pub use presets::PresetStore;
pub use render::{ChainRenderer, ProcessorUpdate, RenderCommand};
