// SPDX-License-Identifier: MIT

//! # pipegraph
//!
//! Spawns a directed graph of child processes wired together with
//! anonymous pipes and pre-existing socket pairs, rearranging each
//! child's descriptor table between `fork` and `exec` to match the
//! slots its command expects.
//!
//! Build a [`Graph`] with [`GraphBuilder`], spawn it with [`Spawner`],
//! and collect exit statuses with [`Reaper`]. Parsing a textual graph
//! description is out of scope; callers assemble a `Graph` themselves
//! or layer their own format on top of [`GraphBuilder`].

pub mod diagnostic;
pub mod error;
pub mod graph;
pub mod permute;
pub mod reaper;
pub mod registry;
pub mod spawner;

pub use diagnostic::{Diagnostic, LogDiagnostic};
pub use error::{GraphError, SpawnError};
pub use graph::{Graph, GraphBuilder, Node, NodeBuilder};
pub use reaper::{ExitStatus, Reaper};
pub use spawner::Spawner;

#[cfg(test)]
mod integration_tests;

/// Every test in this crate that forks shares one OS process, and
/// `Reaper::join` reaps by wait-any: a thread's `waitpid(None)` can just as
/// easily collect a different test's child as its own. The crate's own
/// contract already rules out concurrent forking/reaping in one process
/// (see the Spawner docs), so tests that fork take this lock for their
/// duration to honour it under the default multithreaded test harness.
#[cfg(test)]
pub(crate) static FORK_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
