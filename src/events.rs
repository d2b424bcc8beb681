//! Typed engine notifications
//!
//! Observers register callbacks against a closed set of event variants, so
//! payload shapes are checked at compile time instead of at string-key
//! lookup time.

use crate::chain::{EqualizerBand, ProcessingChain};

/// Everything the engine can notify observers about
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The backend context came up and the graph was built.
    Initialized,
    /// A full chain descriptor was committed.
    ChainUpdated(ProcessingChain),
    /// One or more band gains changed; carries the complete band state.
    EqualizerChange(Vec<EqualizerBand>),
    /// A new effect id entered the registry.
    EffectRegistered { id: String },
    /// An effect's enable flag flipped.
    EffectChange { id: String, enabled: bool },
    /// The render path started consuming audio.
    ProcessingStart,
    /// The render path stopped consuming audio.
    ProcessingStop,
    /// A backend failure on a control-thread operation. The same failure is
    /// also returned to the immediate caller.
    Error { code: &'static str, message: String },
}

impl EngineEvent {
    /// Stable name for logging and transport forwarding
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Initialized => "initialized",
            EngineEvent::ChainUpdated(_) => "chain-updated",
            EngineEvent::EqualizerChange(_) => "equalizer-change",
            EngineEvent::EffectRegistered { .. } => "effect-registered",
            EngineEvent::EffectChange { .. } => "effect-change",
            EngineEvent::ProcessingStart => "processing-start",
            EngineEvent::ProcessingStop => "processing-stop",
            EngineEvent::Error { .. } => "error",
        }
    }
}

type Listener = Box<dyn Fn(&EngineEvent) + Send>;

/// Callback registry for engine events
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for every engine event. Observers filter on the
    /// variants they care about.
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: Fn(&EngineEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    /// Deliver an event to every registered observer, in subscription order.
    pub fn emit(&self, event: &EngineEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
