//! Effect signal graphs.
//!
//! A [`SignalGraph`] is a DAG of [`SignalNode`]s with one designated source (the
//! node that plays the input buffer) and one designated sink (whose output is
//! the rendered signal). Graphs are built per request by [`builder::build_graph`]
//! and compiled for rendering by the `render` module.

pub mod builder;
pub mod effect;
pub mod node;

use std::fmt::{self, Display};

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::audio::BufferError;

pub use builder::{build_graph, GraphOptions};
pub use effect::{EffectSpec, UnknownEffectError};
pub use node::{Connection, ControlParam, SignalNode};

pub type NodeId = NodeIndex;

#[derive(Debug, Clone, PartialEq)]
pub enum GraphConstructionError {
    InvalidSampleRate(u32),
    Empty,
    MissingSource,
    MissingSink,
    /// The designated source is not a playback node, or a second one exists.
    InvalidSource(NodeId),
    UnknownNode(NodeId),
    Cycle(NodeId),
    IncompatibleConnection {
        from: &'static str,
        to: &'static str,
        connection: Connection,
    },
    ImpulseResponse(BufferError),
}

impl Display for GraphConstructionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSampleRate(rate) => write!(f, "invalid sample rate: {}", rate),
            Self::Empty => write!(f, "graph has no nodes"),
            Self::MissingSource => write!(f, "graph has no source node"),
            Self::MissingSink => write!(f, "graph has no sink node"),
            Self::InvalidSource(id) => {
                write!(f, "node {} cannot act as the graph source", id.index())
            }
            Self::UnknownNode(id) => write!(f, "node {} does not exist", id.index()),
            Self::Cycle(id) => write!(f, "graph contains a cycle through node {}", id.index()),
            Self::IncompatibleConnection {
                from,
                to,
                connection,
            } => match connection {
                Connection::Audio => write!(f, "{} cannot take audio input from {}", to, from),
                Connection::Control(param) => {
                    write!(f, "{} has no {} parameter for {} to drive", to, param, from)
                }
            },
            Self::ImpulseResponse(err) => write!(f, "failed to synthesize impulse response: {}", err),
        }
    }
}

impl std::error::Error for GraphConstructionError {}

impl From<BufferError> for GraphConstructionError {
    fn from(err: BufferError) -> Self {
        Self::ImpulseResponse(err)
    }
}

#[derive(Debug, Clone)]
pub struct SignalGraph {
    graph: DiGraph<SignalNode, Connection>,
    source: Option<NodeId>,
    sink: Option<NodeId>,
    sample_rate: u32,
}

impl SignalGraph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: DiGraph::new(),
            source: None,
            sink: None,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn add_node(&mut self, node: SignalNode) -> NodeId {
        self.graph.add_node(node)
    }

    pub fn node(&self, id: NodeId) -> Option<&SignalNode> {
        self.graph.node_weight(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SignalNode)> {
        self.graph
            .node_indices()
            .map(move |id| (id, &self.graph[id]))
    }

    pub fn source(&self) -> Option<NodeId> {
        self.source
    }

    pub fn sink(&self) -> Option<NodeId> {
        self.sink
    }

    pub fn set_source(&mut self, id: NodeId) -> Result<(), GraphConstructionError> {
        let node = self.node(id).ok_or(GraphConstructionError::UnknownNode(id))?;
        if !node.is_source() {
            return Err(GraphConstructionError::InvalidSource(id));
        }
        self.source = Some(id);
        Ok(())
    }

    pub fn set_sink(&mut self, id: NodeId) -> Result<(), GraphConstructionError> {
        self.node(id).ok_or(GraphConstructionError::UnknownNode(id))?;
        self.sink = Some(id);
        Ok(())
    }

    /// Add an edge after checking both endpoints and the connection kind.
    ///
    /// # Errors
    /// Rejects unknown nodes, audio edges into generators, control edges into
    /// parameters the target lacks, and edges that would close a cycle.
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        connection: Connection,
    ) -> Result<(), GraphConstructionError> {
        let from_node = self
            .graph
            .node_weight(from)
            .ok_or(GraphConstructionError::UnknownNode(from))?;
        let to_node = self
            .graph
            .node_weight(to)
            .ok_or(GraphConstructionError::UnknownNode(to))?;

        let compatible = match connection {
            Connection::Audio => to_node.accepts_audio_input(),
            Connection::Control(param) => to_node.accepts_control(param),
        };
        if !compatible {
            return Err(GraphConstructionError::IncompatibleConnection {
                from: from_node.kind_name(),
                to: to_node.kind_name(),
                connection,
            });
        }

        if has_path_connecting(&self.graph, to, from, None) {
            return Err(GraphConstructionError::Cycle(to));
        }

        self.graph.add_edge(from, to, connection);
        Ok(())
    }

    /// Incoming edges of `id` in insertion order.
    pub fn inputs(&self, id: NodeId) -> Vec<(NodeId, Connection)> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(id, Direction::Incoming)
            .map(|edge| (edge.id(), edge.source(), *edge.weight()))
            .collect();
        edges.sort_by_key(|(edge_id, _, _)| *edge_id);
        edges
            .into_iter()
            .map(|(_, source, connection)| (source, connection))
            .collect()
    }

    /// Check the graph is renderable and return its processing order.
    pub fn validate(&self) -> Result<Vec<NodeId>, GraphConstructionError> {
        if self.sample_rate == 0 {
            return Err(GraphConstructionError::InvalidSampleRate(self.sample_rate));
        }
        if self.graph.node_count() == 0 {
            return Err(GraphConstructionError::Empty);
        }

        let source = self.source.ok_or(GraphConstructionError::MissingSource)?;
        let sink = self.sink.ok_or(GraphConstructionError::MissingSink)?;
        for id in [source, sink] {
            self.node(id).ok_or(GraphConstructionError::UnknownNode(id))?;
        }
        if let Some((extra, _)) = self
            .nodes()
            .find(|(id, node)| node.is_source() && *id != source)
        {
            return Err(GraphConstructionError::InvalidSource(extra));
        }
        if !self.graph[source].is_source() {
            return Err(GraphConstructionError::InvalidSource(source));
        }

        toposort(&self.graph, None).map_err(|cycle| GraphConstructionError::Cycle(cycle.node_id()))
    }
}
