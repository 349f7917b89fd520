//! In-memory process graph and its static validators.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;

use crate::diagnostic::{Diagnostic, LogDiagnostic};
use crate::error::GraphError;

/// One child process: a command plus the pipe/socket endpoints it expects
/// to find at given descriptor slots.
#[derive(Debug, Clone)]
pub struct Node {
    pub command: Vec<OsString>,
    pub inputs: HashMap<u32, String>,
    pub outputs: HashMap<u32, String>,
    pub sockets: HashMap<u32, String>,
}

impl Node {
    fn slot_collision(&self) -> Option<u32> {
        let mut seen = HashSet::new();
        for slot in self
            .inputs
            .keys()
            .chain(self.outputs.keys())
            .chain(self.sockets.keys())
        {
            if !seen.insert(*slot) {
                return Some(*slot);
            }
        }
        None
    }
}

/// Builds a [`Node`] one endpoint at a time.
///
/// Unlike the textual configuration format this crate treats as an external
/// collaborator, the builder only accepts well-typed fields; there is no
/// untyped-map layer to tolerate unknown keys in.
#[derive(Debug, Clone, Default)]
pub struct NodeBuilder {
    command: Vec<OsString>,
    inputs: HashMap<u32, String>,
    outputs: HashMap<u32, String>,
    sockets: HashMap<u32, String>,
}

impl NodeBuilder {
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        NodeBuilder {
            command: command.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn input(mut self, slot: u32, pipe: impl Into<String>) -> Self {
        self.inputs.insert(slot, pipe.into());
        self
    }

    pub fn output(mut self, slot: u32, pipe: impl Into<String>) -> Self {
        self.outputs.insert(slot, pipe.into());
        self
    }

    pub fn socket(mut self, slot: u32, socket: impl Into<String>) -> Self {
        self.sockets.insert(slot, socket.into());
        self
    }

    fn build(self) -> Node {
        Node {
            command: self.command,
            inputs: self.inputs,
            outputs: self.outputs,
            sockets: self.sockets,
        }
    }
}

/// A validated, immutable description of a pipe/socket process graph.
///
/// Construct via [`GraphBuilder`]; `Graph` itself exposes no mutators.
#[derive(Debug, Clone)]
pub struct Graph {
    pub(crate) inputs: HashMap<String, i32>,
    pub(crate) outputs: HashMap<String, i32>,
    pub(crate) sockets: HashMap<String, i32>,
    pub(crate) nodes: Vec<Node>,
}

impl Graph {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }
}

/// Builds a [`Graph`] from graph-level endpoints and a node list, then
/// validates it per invariants I1-I5.
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    inputs: HashMap<String, i32>,
    outputs: HashMap<String, i32>,
    sockets: HashMap<String, i32>,
    nodes: Vec<NodeBuilder>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parent-supplied fd that feeds pipe `name` to its readers.
    pub fn input(mut self, name: impl Into<String>, fd: i32) -> Self {
        self.inputs.insert(name.into(), fd);
        self
    }

    /// Register a parent-supplied fd that drains pipe `name` from its
    /// writers.
    pub fn output(mut self, name: impl Into<String>, fd: i32) -> Self {
        self.outputs.insert(name.into(), fd);
        self
    }

    /// Register a parent-supplied pre-existing socket endpoint.
    pub fn socket(mut self, name: impl Into<String>, fd: i32) -> Self {
        self.sockets.insert(name.into(), fd);
        self
    }

    pub fn node(mut self, node: NodeBuilder) -> Self {
        self.nodes.push(node);
        self
    }

    /// Validate and build the graph, using the default [`LogDiagnostic`]
    /// sink for advisory conditions.
    pub fn build(self) -> Result<Graph, GraphError> {
        self.build_with(&LogDiagnostic)
    }

    /// Validate and build the graph, routing advisory conditions through
    /// `diag` instead of the default logger.
    pub fn build_with(self, diag: &dyn Diagnostic) -> Result<Graph, GraphError> {
        let nodes: Vec<Node> = self.nodes.into_iter().map(NodeBuilder::build).collect();
        let graph = Graph {
            inputs: self.inputs,
            outputs: self.outputs,
            sockets: self.sockets,
            nodes,
        };
        validate(&graph, diag)?;
        Ok(graph)
    }
}

/// Apply I1-I5 in order: fatal checks first (aborting construction), then
/// advisory checks (reported via `diag`, never fatal).
fn validate(graph: &Graph, diag: &dyn Diagnostic) -> Result<(), GraphError> {
    // I1: a pipe name may not appear in both inputs and outputs.
    for pipe in graph.inputs.keys() {
        if graph.outputs.contains_key(pipe) {
            return Err(GraphError::PipeCollision {
                pipe: pipe.clone(),
            });
        }
    }

    // I2: a graph-level input name may not be used as a node output
    // (symmetrically for outputs/node inputs).
    for (node_index, node) in graph.nodes.iter().enumerate() {
        for pipe in node.outputs.values() {
            if graph.inputs.contains_key(pipe) {
                return Err(GraphError::PipeDirectionConflict {
                    pipe: pipe.clone(),
                });
            }
        }
        for pipe in node.inputs.values() {
            if graph.outputs.contains_key(pipe) {
                return Err(GraphError::PipeDirectionConflict {
                    pipe: pipe.clone(),
                });
            }
        }
        if node.command.is_empty() {
            return Err(GraphError::EmptyCommand { node_index });
        }
        if let Some(slot) = node.slot_collision() {
            return Err(GraphError::SlotCollision { node_index, slot });
        }
    }

    // I5: each socket name should appear exactly twice across node
    // socket-maps; 1 or >2 uses warn but do not abort.
    let mut socket_uses: HashMap<&str, u32> = HashMap::new();
    for node in &graph.nodes {
        for socket in node.sockets.values() {
            *socket_uses.entry(socket.as_str()).or_insert(0) += 1;
        }
    }
    for (socket, count) in &socket_uses {
        if *count != 2 {
            diag.warn(&format!(
                "socket '{socket}' used {count} time(s); expected exactly 2"
            ));
        }
    }

    // I4: a pipe that is never read or never written is a dead end; warn
    // only, since a graph output/input may serve as the missing side.
    let mut readers: HashSet<&str> = HashSet::new();
    let mut writers: HashSet<&str> = HashSet::new();
    for pipe in graph.inputs.keys() {
        writers.insert(pipe.as_str());
    }
    for pipe in graph.outputs.keys() {
        readers.insert(pipe.as_str());
    }
    for node in &graph.nodes {
        for pipe in node.inputs.values() {
            readers.insert(pipe.as_str());
        }
        for pipe in node.outputs.values() {
            writers.insert(pipe.as_str());
        }
    }
    for pipe in readers.union(&writers) {
        if !readers.contains(pipe) {
            diag.warn(&format!("pipe '{pipe}' is never read"));
        }
        if !writers.contains(pipe) {
            diag.warn(&format!("pipe '{pipe}' is never written"));
        }
    }

    Ok(())
}
