//! Structured observability hooks for the run lifecycle.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `RunSpan` RAII guard
//! - Emission functions for key lifecycle events: start, spawn, quit, shutdown
//!   transitions, finish
//!
//! Events are emitted at `info!` level unless noted (filter with `RUST_LOG`).

use tracing::info;

use crate::supervisor::ShutdownState;

/// RAII guard that enters a run-scoped tracing span for the duration of a run.
///
/// # Example
///
/// ```ignore
/// let _span = RunSpan::enter("3f2a...", "naca0012.dat");
/// // every event below now carries run_id and airfoil
/// ```
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    /// Create and enter a span tagged with the run id and airfoil.
    pub fn enter(run_id: &str, airfoil: &str) -> Self {
        let span = tracing::info_span!("polarsweep.run", run_id = %run_id, airfoil = %airfoil);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: run started.
pub fn emit_run_started(run_id: &str, label: &str, commands: usize, digest: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        label = %label,
        commands = commands,
        digest = %digest,
    );
}

/// Emit event: child spawned.
pub fn emit_child_spawned(pid: Option<u32>) {
    info!(event = "child.spawned", pid = ?pid, "PID of child process is {:?}", pid);
}

/// Emit event: quit command delivered.
pub fn emit_quit_issued(commands_sent: u64) {
    info!(event = "child.quit_issued", commands_sent = commands_sent, "quit command issued");
}

/// Emit event: one shutdown state machine transition.
pub fn emit_shutdown_transition(from: ShutdownState, to: ShutdownState) {
    info!(event = "shutdown.transition", from = %from, to = %to);
}

/// Emit event: run finished with duration and success status.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, commands_sent: u64, success: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        commands_sent = commands_sent,
        success = success,
    );
}

/// Emit event: run failed (error level).
pub fn emit_run_failed(run_id: &str, error: &dyn std::fmt::Display) {
    tracing::error!(event = "run.failed", run_id = %run_id, error = %error);
}
