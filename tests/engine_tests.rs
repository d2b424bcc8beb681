//! End-to-end engine scenarios through the public API.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use resona::{
    DspEngine, EngineEvent, NodeKind, ProcessingChain, BAND_COUNT,
};

const SAMPLE_RATE: f32 = 48_000.0;

fn ready_engine() -> DspEngine {
    let mut engine = DspEngine::new();
    engine.initialize(SAMPLE_RATE).unwrap();
    engine
}

#[test]
fn fresh_engine_baseline() {
    let mut engine = ready_engine();

    let chain = engine.chain();
    assert_eq!(chain, ProcessingChain::default());
    assert_eq!(chain.master_volume, 0.8);
    assert!(!chain.compressor.enabled);
    assert_eq!(chain.equalizer.bands.len(), BAND_COUNT);
    assert!(chain.equalizer.bands.iter().all(|b| b.gain == 0.0));

    let state = engine.state();
    assert!(state.enabled);
    assert!(!state.processing);
    assert!(state.active_effect_ids.is_empty());

    assert_eq!(engine.input_destination(), Some(NodeKind::Band(0)));
}

#[test]
fn bass_boost_preset_shapes_the_bands() {
    let mut engine = ready_engine();
    engine.load_preset("Bass Boost").unwrap();

    let gains = engine.band_gains();
    assert_eq!(&gains[..3], &[8.0, 6.0, 3.0]);
    assert!(gains[3..].iter().all(|&g| g == 0.0));
    assert!(!engine.compressor_settings().enabled);
}

#[test]
fn saved_preset_survives_later_edits() {
    let mut engine = ready_engine();
    engine.set_band(2, 4.0).unwrap();
    engine.set_compressor_threshold(-30.0).unwrap();
    engine.save_preset("My Mix").unwrap();
    let saved = engine.chain();

    // Trash the live state, then restore.
    engine.load_equalizer_preset("full-bass").unwrap();
    engine.set_master_volume(0.1).unwrap();
    engine.load_preset("My Mix").unwrap();
    assert_eq!(engine.chain(), saved);

    // And edits after the load never leak back into the store.
    engine.set_band(2, -9.0).unwrap();
    engine.load_preset("My Mix").unwrap();
    assert_eq!(engine.band_gains()[2], 4.0);
}

#[test]
fn reset_returns_to_flat() {
    let mut engine = ready_engine();
    engine.load_equalizer_preset("party").unwrap();
    assert_ne!(engine.band_gains(), [0.0; BAND_COUNT]);

    engine.reset_equalizer().unwrap();
    assert_eq!(engine.band_gains(), [0.0; BAND_COUNT]);
}

#[test]
fn preset_names_keep_builtin_order() {
    let engine = DspEngine::new();
    let names = engine.preset_names();
    assert_eq!(
        names,
        vec![
            "Flat (Default)",
            "Bass Boost",
            "Vocal Clarity",
            "Heavy Compression"
        ]
    );
}

#[test]
fn rebuilds_converge_while_applying_chains() {
    let mut engine = ready_engine();
    let reference = engine.rebuild_graph().unwrap();

    engine.load_preset("Heavy Compression").unwrap();
    let after_preset = engine.rebuild_graph().unwrap();
    engine.load_preset("Flat (Default)").unwrap();
    let after_flat = engine.rebuild_graph().unwrap();

    // Parameter changes never alter the topology.
    assert_eq!(reference, after_preset);
    assert_eq!(reference, after_flat);
}

#[test]
fn audio_flows_through_the_renderer() {
    let mut engine = ready_engine();
    let mut renderer = engine.take_renderer().unwrap();
    engine.set_master_volume(1.0).unwrap();
    engine.start_processing().unwrap();

    let sine = |i: usize| (2.0 * std::f32::consts::PI * 440.0 * (i / 2) as f32 / SAMPLE_RATE).sin();
    let mut block: Vec<f32> = (0..8192).map(sine).collect();

    // Run enough blocks for the volume ramp to settle.
    for _ in 0..12 {
        for (i, s) in block.iter_mut().enumerate() {
            *s = sine(i);
        }
        renderer.process_block(&mut block, 2);
    }

    let rms = (block.iter().map(|s| s * s).sum::<f32>() / block.len() as f32).sqrt();
    let input_rms = (0.5f32).sqrt();
    // Flat EQ at unity volume: the chain is transparent.
    assert!(
        (rms - input_rms).abs() < 0.05,
        "expected transparency, rms {rms} vs {input_rms}"
    );

    // The analysis tap saw the audio.
    let spectrum = engine.analysis_mut().unwrap().frequency_data();
    assert!(spectrum.iter().any(|&m| m > 0.01));
}

#[test]
fn stopping_processing_makes_the_renderer_transparent() {
    let mut engine = ready_engine();
    let mut renderer = engine.take_renderer().unwrap();
    engine.start_processing().unwrap();

    let mut block = vec![0.5f32; 512];
    renderer.process_block(&mut block, 2);

    engine.stop_processing().unwrap();
    block.fill(0.5);
    renderer.process_block(&mut block, 2);
    assert!(block.iter().all(|&s| s == 0.5));
}

#[test]
fn enabled_effects_reach_the_render_path() {
    let mut engine = ready_engine();
    let mut renderer = engine.take_renderer().unwrap();
    engine.set_master_volume(1.0).unwrap();
    engine.set_equalizer_enabled(false).unwrap();
    engine.set_effect_enabled("bass-boost", true).unwrap();
    engine.start_processing().unwrap();

    let mut block = vec![0.4f32; 1024];
    for _ in 0..40 {
        block.fill(0.4);
        renderer.process_block(&mut block, 2);
    }
    // bass-boost at its default amount of 50 is a flat 1.5x.
    let tail = block[block.len() - 1];
    assert!((tail - 0.6).abs() < 0.01, "expected 0.6, got {tail}");
}

#[test]
fn event_stream_for_a_session() {
    let mut engine = ready_engine();
    let kinds: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    engine.subscribe(move |event| sink.lock().unwrap().push(event.kind()));

    engine.set_band(0, 3.0).unwrap();
    engine.set_effect_enabled("reverb", true).unwrap();
    engine.start_processing().unwrap();
    let _ = engine.load_preset("Does Not Exist");
    engine.stop_processing().unwrap();

    assert_eq!(
        *kinds.lock().unwrap(),
        vec![
            "equalizer-change",
            "effect-change",
            "processing-start",
            "error",
            "processing-stop"
        ]
    );
}

#[test]
fn chain_updated_event_carries_the_committed_chain() {
    let mut engine = ready_engine();
    let payload: Arc<Mutex<Option<ProcessingChain>>> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&payload);
    engine.subscribe(move |event| {
        if let EngineEvent::ChainUpdated(chain) = event {
            *sink.lock().unwrap() = Some(chain.clone());
        }
    });

    let mut chain = ProcessingChain::default();
    chain.equalizer.bands[9].gain = 26.0; // clamped on commit
    engine.apply_chain(chain).unwrap();

    let seen = payload.lock().unwrap().clone().unwrap();
    assert_eq!(seen.equalizer.bands[9].gain, 20.0);
    assert_eq!(seen, engine.chain());
}

#[test]
fn json_chain_boundary() {
    let mut engine = ready_engine();

    let value = serde_json::to_value(ProcessingChain::default()).unwrap();
    engine.apply_chain_value(value).unwrap();

    let missing = serde_json::json!({ "masterVolume": 0.5 });
    let err = engine.apply_chain_value(missing).unwrap_err();
    assert_eq!(err.error_code(), "INVALID_CHAIN");
}

#[test]
fn shutdown_mid_session() {
    let mut engine = ready_engine();
    let mut renderer = engine.take_renderer().unwrap();
    engine.start_processing().unwrap();
    engine.shutdown();

    // The renderer keeps running on its last state after the control side
    // is gone.
    let mut block = vec![0.2f32; 512];
    renderer.process_block(&mut block, 2);
    assert!(block.iter().all(|s| s.is_finite()));

    assert!(engine.set_band(0, 1.0).is_err());
}
