//! Fork/exec orchestration: builds each child's fd mapping from the
//! endpoint registry, applies the permutation engine in the child, and
//! accumulates pids for the reaper.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;

use nix::unistd::{execv, fork, ForkResult, Pid};

use crate::diagnostic::{Diagnostic, LogDiagnostic};
use crate::error::SpawnError;
use crate::graph::Graph;
use crate::permute::{mark_inheritable, FdPermutation};
use crate::registry::EndpointRegistry;

/// `command[0]` failed to exec; the child reports this distinctive code
/// instead of whatever the shell convention for "not found" would be,
/// since there is no shell here to assign it.
pub const EXEC_FAILED_EXIT_CODE: i32 = 127;

/// Orchestrates per-node fork/exec for one validated [`Graph`].
pub struct Spawner<'d> {
    registry: EndpointRegistry,
    diag: &'d dyn Diagnostic,
    children: HashMap<Pid, String>,
}

impl<'d> Spawner<'d> {
    /// Build a spawner for `graph`, pre-registering its graph-level
    /// input/output/socket fds, using the default [`LogDiagnostic`] sink.
    pub fn new(graph: &Graph) -> Result<Self, SpawnError> {
        Self::new_with(graph, &LogDiagnostic)
    }

    /// As [`Spawner::new`], routing diagnostics through `diag`.
    pub fn new_with(graph: &Graph, diag: &'d dyn Diagnostic) -> Result<Self, SpawnError> {
        let mut registry = EndpointRegistry::new();
        for (name, fd) in &graph.inputs {
            registry.register_input(name.clone(), *fd)?;
        }
        for (name, fd) in &graph.outputs {
            registry.register_output(name.clone(), *fd)?;
        }
        for (name, fd) in &graph.sockets {
            registry.register_socket(name.clone(), *fd)?;
        }
        Ok(Spawner {
            registry,
            diag,
            children: HashMap::new(),
        })
    }

    /// Fork and exec every node in `graph`, in order, returning this
    /// spawner so the caller can `close_fds` and then hand it to a
    /// [`crate::reaper::Reaper`].
    pub fn spawn_all(&mut self, graph: &Graph) -> Result<(), SpawnError> {
        for node in graph.nodes() {
            self.spawn(
                &node.command,
                &node.inputs,
                &node.outputs,
                &node.sockets,
            )?;
        }
        Ok(())
    }

    /// Fork and exec a single node's command, returning the new pid.
    pub fn spawn(
        &mut self,
        command: &[std::ffi::OsString],
        inputs: &HashMap<u32, String>,
        outputs: &HashMap<u32, String>,
        sockets: &HashMap<u32, String>,
    ) -> Result<Pid, SpawnError> {
        let program = command[0].to_string_lossy().into_owned();
        let resolved = which::which(&command[0]).map_err(|e| SpawnError::CommandNotFound {
            command: program.clone(),
            source: e,
        })?;

        let mut mapping: HashMap<u32, RawFd> = HashMap::new();
        let mut to_close_after_fork: Vec<OwnedFd> = Vec::new();

        for (slot, pipe) in inputs {
            mapping.insert(*slot, self.registry.reading_end_fd(pipe)?);
        }
        for (slot, pipe) in outputs {
            mapping.insert(*slot, self.registry.writing_end_fd(pipe)?);
        }
        for (slot, socket) in sockets {
            let fd = self.registry.take_socket_end(socket, self.diag)?;
            mapping.insert(*slot, fd.as_raw_fd());
            to_close_after_fork.push(fd);
        }

        let exec_path = CString::new(resolved.as_os_str().as_bytes())
            .expect("resolved path contains no interior NUL");
        let mut argv: Vec<CString> = Vec::with_capacity(command.len());
        for arg in command {
            argv.push(CString::new(arg.as_bytes()).expect("argument contains no interior NUL"));
        }
        let slots: Vec<u32> = mapping.keys().copied().collect();

        match unsafe { fork() }.map_err(|e| SpawnError::Fork { source: e.into() })? {
            ForkResult::Child => {
                // Any failure from here must terminate the child directly;
                // there is no caller left to propagate a `Result` to.
                if FdPermutation::new(mapping).apply().is_err() {
                    std::process::exit(EXEC_FAILED_EXIT_CODE);
                }
                if mark_inheritable(&slots).is_err() {
                    std::process::exit(EXEC_FAILED_EXIT_CODE);
                }
                let _ = execv(&exec_path, &argv);
                // Only reachable if exec failed.
                std::process::exit(EXEC_FAILED_EXIT_CODE);
            }
            ForkResult::Parent { child } => {
                self.diag.info(&format!("spawned node {child} command={program} slots={slots:?}"));
                self.children.insert(child, program);
                // The to-close list holds the socket ends we handed to this
                // child; the registry still owns the other end for a future
                // spawn. Drop closes our copy now that the child has it.
                drop(to_close_after_fork);
                Ok(child)
            }
        }
    }

    /// Close every registry-held pipe endpoint and any surplus socket end.
    pub fn close_fds(&mut self) {
        self.registry.close_all(self.diag);
    }

    /// The set of pids spawned so far, for handoff to a [`crate::reaper::Reaper`].
    pub fn children(&self) -> HashMap<Pid, String> {
        self.children.clone()
    }
}
