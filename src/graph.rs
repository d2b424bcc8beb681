//! Audio graph construction
//!
//! Translates a `ProcessingChain` into a connected set of processing nodes:
//! band filters in series, then compressor, master gain, analysis tap, and
//! the output sink. Sources feed `input_destination()`.
//!
//! `rebuild_graph` is idempotent: rebuilding with the same chain produces
//! the same observable topology, and repeated or overlapping rebuild
//! requests converge without leaking dangling connections. That idempotence
//! is what makes rebuilding safe while audio is flowing.

use tracing::debug;

use crate::chain::ProcessingChain;
use crate::error::{DspError, Result};

/// Lowest sample rate the render context supports.
const MIN_SAMPLE_RATE: f32 = 8_000.0;
/// Highest sample rate the render context supports.
const MAX_SAMPLE_RATE: f32 = 384_000.0;

/// Opaque handle to a graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// What a node does in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Filter node for equalizer band `index`
    Band(usize),
    Compressor,
    MasterGain,
    AnalysisTap,
    OutputSink,
}

#[derive(Debug, Clone)]
struct Node {
    id: NodeId,
    kind: NodeKind,
    connected: bool,
}

/// Comparable snapshot of the graph's observable shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphTopology {
    pub nodes: Vec<NodeKind>,
    pub edges: Vec<(NodeKind, NodeKind)>,
}

impl GraphTopology {
    pub fn connection_count(&self) -> usize {
        self.edges.len()
    }
}

/// Owns graph lifecycle: node allocation, wiring, and rebuilds.
#[derive(Debug)]
pub struct AudioGraphBuilder {
    sample_rate: f32,
    next_id: u32,
    band_nodes: Vec<Node>,
    compressor: Node,
    master_gain: Node,
    analysis_tap: Node,
    output_sink: Node,
    edges: Vec<(NodeId, NodeId)>,
}

impl AudioGraphBuilder {
    /// Allocate the backend processing context.
    ///
    /// Fails with `EngineInit` when the context cannot be represented (a
    /// host that cannot open its device at all maps that failure to the
    /// same error before constructing the engine). Fatal for the engine
    /// instance, not the process.
    pub fn new(sample_rate_hz: f32) -> Result<Self> {
        if !sample_rate_hz.is_finite()
            || !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate_hz)
        {
            return Err(DspError::EngineInit {
                reason: format!("unsupported sample rate {sample_rate_hz} Hz"),
            });
        }

        let mut next_id = 0u32;
        let mut alloc = |kind: NodeKind| {
            let node = Node {
                id: NodeId(next_id),
                kind,
                connected: false,
            };
            next_id += 1;
            node
        };

        let compressor = alloc(NodeKind::Compressor);
        let master_gain = alloc(NodeKind::MasterGain);
        let analysis_tap = alloc(NodeKind::AnalysisTap);
        let output_sink = alloc(NodeKind::OutputSink);

        Ok(Self {
            sample_rate: sample_rate_hz,
            next_id,
            band_nodes: Vec::new(),
            compressor,
            master_gain,
            analysis_tap,
            output_sink,
            edges: Vec::new(),
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Tear down and rewire the whole graph from a chain descriptor.
    pub fn rebuild_graph(&mut self, chain: &ProcessingChain) -> GraphTopology {
        self.disconnect_all();

        // Fresh filter node per band, configured from the descriptor.
        self.band_nodes = chain
            .equalizer
            .bands
            .iter()
            .enumerate()
            .map(|(index, _)| {
                let node = Node {
                    id: NodeId(self.next_id),
                    kind: NodeKind::Band(index),
                    connected: false,
                };
                self.next_id += 1;
                node
            })
            .collect();

        // band0 -> band1 -> ... -> bandN
        for pair in 0..self.band_nodes.len().saturating_sub(1) {
            let from = self.band_nodes[pair].id;
            let to = self.band_nodes[pair + 1].id;
            self.connect(from, to);
        }

        // last band -> compressor; with no bands the compressor is the
        // head of the chain.
        if let Some(last_band) = self.band_nodes.last() {
            let from = last_band.id;
            self.connect(from, self.compressor.id);
        }

        let (comp, master, tap, sink) = (
            self.compressor.id,
            self.master_gain.id,
            self.analysis_tap.id,
            self.output_sink.id,
        );
        self.connect(comp, master);
        self.connect(master, tap);
        self.connect(tap, sink);

        for node in self.nodes_mut() {
            node.connected = true;
        }

        self.topology()
    }

    /// Best-effort disconnect of every node. Disconnecting an already
    /// disconnected node is not a fault for this engine: it is logged and
    /// swallowed, never propagated.
    fn disconnect_all(&mut self) {
        for node in self.nodes_mut() {
            if !node.connected {
                debug!(node = ?node.kind, "disconnect skipped: node already detached");
                continue;
            }
            node.connected = false;
        }
        self.edges.clear();
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        self.edges.push((from, to));
    }

    fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.band_nodes
            .iter_mut()
            .chain(std::iter::once(&mut self.compressor))
            .chain(std::iter::once(&mut self.master_gain))
            .chain(std::iter::once(&mut self.analysis_tap))
            .chain(std::iter::once(&mut self.output_sink))
    }

    fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.band_nodes
            .iter()
            .chain(std::iter::once(&self.compressor))
            .chain(std::iter::once(&self.master_gain))
            .chain(std::iter::once(&self.analysis_tap))
            .chain(std::iter::once(&self.output_sink))
    }

    fn kind_of(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes().find(|n| n.id == id).map(|n| n.kind)
    }

    /// The node a source should feed into: first equalizer band when bands
    /// exist, else the compressor, else the master gain. Never absent once
    /// construction succeeded.
    pub fn input_destination(&self) -> NodeId {
        self.band_nodes
            .first()
            .map(|n| n.id)
            .unwrap_or(self.compressor.id)
    }

    pub fn input_destination_kind(&self) -> NodeKind {
        self.band_nodes
            .first()
            .map(|n| n.kind)
            .unwrap_or(NodeKind::Compressor)
    }

    /// Snapshot the current shape for comparison and inspection.
    pub fn topology(&self) -> GraphTopology {
        GraphTopology {
            nodes: self.nodes().map(|n| n.kind).collect(),
            edges: self
                .edges
                .iter()
                .filter_map(|&(from, to)| Some((self.kind_of(from)?, self.kind_of(to)?)))
                .collect(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.edges.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unsupported_sample_rate() {
        assert!(AudioGraphBuilder::new(0.0).is_err());
        assert!(AudioGraphBuilder::new(-48000.0).is_err());
        assert!(AudioGraphBuilder::new(f32::NAN).is_err());
        let err = AudioGraphBuilder::new(100.0).unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_INIT");
    }

    #[test]
    fn test_full_chain_topology() {
        let mut builder = AudioGraphBuilder::new(48000.0).unwrap();
        let topology = builder.rebuild_graph(&ProcessingChain::default());

        // 9 band-to-band edges + band9->comp + comp->master + master->tap
        // + tap->sink
        assert_eq!(topology.connection_count(), 13);
        assert_eq!(
            topology.edges[0],
            (NodeKind::Band(0), NodeKind::Band(1))
        );
        assert_eq!(
            topology.edges.last().copied().unwrap(),
            (NodeKind::AnalysisTap, NodeKind::OutputSink)
        );
        assert!(topology
            .edges
            .contains(&(NodeKind::Band(9), NodeKind::Compressor)));
        assert_eq!(builder.input_destination_kind(), NodeKind::Band(0));
    }

    #[test]
    fn test_empty_band_list() {
        let mut builder = AudioGraphBuilder::new(48000.0).unwrap();
        let mut chain = ProcessingChain::default();
        chain.equalizer.bands.clear();

        let topology = builder.rebuild_graph(&chain);
        assert_eq!(topology.connection_count(), 3);
        assert_eq!(
            topology.edges[0],
            (NodeKind::Compressor, NodeKind::MasterGain)
        );
        assert_eq!(builder.input_destination_kind(), NodeKind::Compressor);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut builder = AudioGraphBuilder::new(48000.0).unwrap();
        let chain = ProcessingChain::default();

        let first = builder.rebuild_graph(&chain);
        let second = builder.rebuild_graph(&chain);
        let third = builder.rebuild_graph(&chain);

        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(builder.connection_count(), first.connection_count());
    }

    #[test]
    fn test_rebuild_converges_after_structural_change() {
        let mut builder = AudioGraphBuilder::new(48000.0).unwrap();
        let full = ProcessingChain::default();
        let mut empty = ProcessingChain::default();
        empty.equalizer.bands.clear();

        let reference = builder.rebuild_graph(&full);
        builder.rebuild_graph(&empty);
        let back = builder.rebuild_graph(&full);
        assert_eq!(reference, back);
    }

    #[test]
    fn test_input_destination_never_dangles() {
        let mut builder = AudioGraphBuilder::new(44100.0).unwrap();
        // Valid even before the first rebuild.
        assert_eq!(builder.input_destination_kind(), NodeKind::Compressor);
        builder.rebuild_graph(&ProcessingChain::default());
        assert_eq!(builder.input_destination_kind(), NodeKind::Band(0));
    }
}
