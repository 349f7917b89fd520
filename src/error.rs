//! Error taxonomy.
//!
//! Construction-time failures (invariant violations in a [`crate::Graph`])
//! and run-time failures (kernel calls during spawn/reap) are different
//! types: a `GraphError` means no process was ever forked, while a
//! `SpawnError` means some resources may already be live and must be
//! cleaned up by the caller.

use std::fmt;

/// Invariant violation discovered while validating a [`crate::Graph`].
///
/// Surfaced before any pipe, socket, or process is created.
#[derive(Debug)]
pub enum GraphError {
    /// A pipe name appears in both `inputs` and `outputs`.
    PipeCollision { pipe: String },
    /// A graph-level input/output name is also used as a node endpoint of
    /// the same name in the conflicting direction.
    PipeDirectionConflict { pipe: String },
    /// Two endpoints within one node claim the same descriptor slot.
    SlotCollision { node_index: usize, slot: u32 },
    /// A node's command list is empty.
    EmptyCommand { node_index: usize },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PipeCollision { pipe } => {
                write!(f, "pipe '{pipe}' appears in both graph inputs and outputs")
            }
            Self::PipeDirectionConflict { pipe } => {
                write!(f, "pipe '{pipe}' used in conflicting directions")
            }
            Self::SlotCollision { node_index, slot } => {
                write!(f, "node {node_index}: descriptor slot {slot} is claimed by more than one endpoint")
            }
            Self::EmptyCommand { node_index } => {
                write!(f, "node {node_index}: command is empty")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// A run-time failure while spawning or reaping children.
///
/// Previously spawned children are unaffected by a later `SpawnError`; the
/// caller remains responsible for reaping them.
#[derive(Debug)]
pub enum SpawnError {
    /// Failed to create a pipe for the named pipe.
    Pipe { pipe: String, source: std::io::Error },
    /// Failed to create a socket pair for the named socket.
    SocketPair { socket: String, source: std::io::Error },
    /// `command[0]` could not be resolved against `PATH`.
    CommandNotFound { command: String, source: which::Error },
    /// `fork` failed.
    Fork { source: std::io::Error },
    /// `dup`/`dup2`/`close` failed while rearranging the child's descriptor
    /// table.
    DescriptorRewrite { slot: u32, source: std::io::Error },
    /// `waitpid` failed.
    Wait { source: std::io::Error },
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pipe { pipe, .. } => write!(f, "failed to create pipe '{pipe}'"),
            Self::SocketPair { socket, .. } => {
                write!(f, "failed to create socket pair '{socket}'")
            }
            Self::CommandNotFound { command, .. } => {
                write!(f, "could not resolve command '{command}' on PATH")
            }
            Self::Fork { .. } => write!(f, "fork failed"),
            Self::DescriptorRewrite { slot, .. } => {
                write!(f, "failed to rewrite descriptor slot {slot} in child")
            }
            Self::Wait { .. } => write!(f, "wait failed"),
        }
    }
}

impl std::error::Error for SpawnError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pipe { source, .. } => Some(source),
            Self::SocketPair { source, .. } => Some(source),
            Self::CommandNotFound { source, .. } => Some(source),
            Self::Fork { source } => Some(source),
            Self::DescriptorRewrite { source, .. } => Some(source),
            Self::Wait { source } => Some(source),
        }
    }
}
