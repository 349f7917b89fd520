//! The pluggable logging collaborator.
//!
//! Graph validation and the endpoint registry report advisory conditions
//! (dead-end pipes, socket under/over-use, non-zero child exits) through a
//! `&dyn Diagnostic` rather than a process-global singleton. [`LogDiagnostic`]
//! is the default, forwarding to the `log` crate.

/// Receives advisory messages that never abort an operation.
pub trait Diagnostic {
    fn warn(&self, message: &str);
    fn info(&self, message: &str);
}

/// Forwards to the `log` crate's global dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostic;

impl Diagnostic for LogDiagnostic {
    fn warn(&self, message: &str) {
        log::warn!("{message}");
    }

    fn info(&self, message: &str) {
        log::info!("{message}");
    }
}
