//! Reaps spawned children and reports their exit status.

use std::collections::HashMap;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;

use crate::diagnostic::{Diagnostic, LogDiagnostic};
use crate::error::SpawnError;

/// How a child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The child called `exit` (or returned from `main`) with this code.
    Exited(i32),
    /// The child was terminated by this signal.
    Signaled(Signal),
}

impl ExitStatus {
    /// A shell-style exit code: the raw code on a normal exit, or 128+signal
    /// on a signal death, matching the convention `$?` reports.
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::Exited(code) => *code,
            ExitStatus::Signaled(signal) => 128 + *signal as i32,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

/// Waits on a fixed set of pids, ignoring unrelated ones, until all are
/// accounted for. Each pid's spawning command is kept only for diagnostics;
/// nodes may share a command, so it cannot double as a map key.
pub struct Reaper<'d> {
    pending: HashMap<Pid, String>,
    diag: &'d dyn Diagnostic,
}

impl Reaper<'static> {
    /// Build a reaper for `children`, using the default [`LogDiagnostic`] sink.
    pub fn new(children: HashMap<Pid, String>) -> Self {
        Reaper::new_with(children, &LogDiagnostic)
    }
}

impl<'d> Reaper<'d> {
    /// As [`Reaper::new`], routing a non-zero exit's diagnostic through `diag`.
    pub fn new_with(children: HashMap<Pid, String>, diag: &'d dyn Diagnostic) -> Self {
        Reaper { pending: children, diag }
    }

    /// Block until every tracked pid has exited, returning each one's
    /// status keyed by pid.
    pub fn join(mut self) -> Result<HashMap<Pid, ExitStatus>, SpawnError> {
        let mut statuses = HashMap::new();
        while !self.pending.is_empty() {
            let status = waitpid(None, None).map_err(|e| SpawnError::Wait { source: e.into() })?;
            let (pid, exit) = match status {
                WaitStatus::Exited(pid, code) => (pid, ExitStatus::Exited(code)),
                WaitStatus::Signaled(pid, signal, _) => (pid, ExitStatus::Signaled(signal)),
                // Stopped/PtraceEvent/PtraceSyscall/Continued/StillAlive
                // never terminate a child; only relevant with WUNTRACED or
                // WCONTINUED, which this reaper never passes.
                _ => continue,
            };
            if let Some(command) = self.pending.remove(&pid) {
                if !exit.success() {
                    self.diag.warn(&format!(
                        "child {pid} ({command}) exited with {exit:?}"
                    ));
                }
                statuses.insert(pid, exit);
            }
        }
        Ok(statuses)
    }

    /// Send `signal` to every still-tracked child. Not invoked automatically
    /// by `join`; callers decide when a partial failure warrants tearing
    /// down the rest of the graph.
    pub fn kill_all(&self, signal: Signal) -> Result<(), SpawnError> {
        for &pid in self.pending.keys() {
            kill(pid, signal).map_err(|e| SpawnError::Wait { source: e.into() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::libc;
    use nix::unistd::{fork, ForkResult};

    fn spawn_exit(code: i32) -> Pid {
        match unsafe { fork() }.expect("fork failed") {
            ForkResult::Child => unsafe { libc::_exit(code) },
            ForkResult::Parent { child } => child,
        }
    }

    fn spawn_self_signal(signal: Signal) -> Pid {
        match unsafe { fork() }.expect("fork failed") {
            ForkResult::Child => {
                kill(Pid::this(), signal).ok();
                unsafe { libc::_exit(1) };
            }
            ForkResult::Parent { child } => child,
        }
    }

    #[test]
    fn join_reports_normal_exit_code() {
        let _guard = crate::FORK_TEST_LOCK.lock().unwrap();
        let pid = spawn_exit(7);
        let mut children = HashMap::new();
        children.insert(pid, "a".to_string());
        let statuses = Reaper::new(children).join().unwrap();
        assert_eq!(statuses[&pid], ExitStatus::Exited(7));
        assert_eq!(statuses[&pid].code(), 7);
    }

    #[test]
    fn join_reports_signal_death() {
        let _guard = crate::FORK_TEST_LOCK.lock().unwrap();
        let pid = spawn_self_signal(Signal::SIGKILL);
        let mut children = HashMap::new();
        children.insert(pid, "a".to_string());
        let statuses = Reaper::new(children).join().unwrap();
        assert_eq!(statuses[&pid], ExitStatus::Signaled(Signal::SIGKILL));
        assert_eq!(statuses[&pid].code(), 128 + Signal::SIGKILL as i32);
    }

    struct CollectDiagnostic {
        warnings: std::sync::Mutex<Vec<String>>,
    }

    impl CollectDiagnostic {
        fn new() -> Self {
            CollectDiagnostic {
                warnings: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl Diagnostic for CollectDiagnostic {
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
        fn info(&self, _message: &str) {}
    }

    #[test]
    fn join_warns_on_non_zero_exit_but_not_on_success() {
        let _guard = crate::FORK_TEST_LOCK.lock().unwrap();
        let diag = CollectDiagnostic::new();
        let ok = spawn_exit(0);
        let bad = spawn_exit(3);
        let mut children = HashMap::new();
        children.insert(ok, "good".to_string());
        children.insert(bad, "bad".to_string());
        Reaper::new_with(children, &diag).join().unwrap();
        let warnings = diag.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bad"));
    }

    #[test]
    fn join_waits_for_all_tracked_pids() {
        let _guard = crate::FORK_TEST_LOCK.lock().unwrap();
        let a = spawn_exit(0);
        let b = spawn_exit(2);
        let mut children = HashMap::new();
        children.insert(a, "a".to_string());
        children.insert(b, "b".to_string());
        let statuses = Reaper::new(children).join().unwrap();
        assert!(statuses[&a].success());
        assert_eq!(statuses[&b].code(), 2);
    }
}
