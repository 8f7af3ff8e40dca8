//! Escalating shutdown of the driven tool.
//!
//! ```text
//! Running -> QuitIssued -> NaturallyExited
//!                       -> TimedOut -> Terminating -> NaturallyExited
//!                                                  -> TimedOut2 -> Killed -> Reaped
//! ```
//!
//! Every wait is bounded, so the machine always reaches a terminal state
//! whether or not the child cooperates.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::obs;
use crate::process::{ChildProcess, ExitInfo, ProcessHandle, ProcessState};
use crate::sequence::QUIT_COMMAND;

/// Bounds for each escalation stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Wait for a natural exit after quit (milliseconds).
    pub exit_wait_ms: u64,
    /// Wait for exit after the terminate signal (milliseconds).
    pub term_wait_ms: u64,
    /// Wait for the exit status after the kill signal (milliseconds).
    pub reap_timeout_ms: u64,
    /// Interval between exit polls (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            exit_wait_ms: 30_000,
            term_wait_ms: 30_000,
            reap_timeout_ms: 10_000,
            poll_interval_ms: 250,
        }
    }
}

impl ShutdownConfig {
    pub fn exit_wait(&self) -> Duration {
        Duration::from_millis(self.exit_wait_ms)
    }

    pub fn term_wait(&self) -> Duration {
        Duration::from_millis(self.term_wait_ms)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Longest time a full escalation can take.
    pub fn worst_case(&self) -> Duration {
        self.exit_wait() + self.term_wait() + self.reap_timeout() + self.poll_interval()
    }
}

/// States of the shutdown machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Running,
    QuitIssued,
    NaturallyExited,
    TimedOut,
    Terminating,
    TimedOut2,
    Killed,
    Reaped,
}

impl ShutdownState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownState::NaturallyExited | ShutdownState::Reaped)
    }
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownState::Running => "running",
            ShutdownState::QuitIssued => "quit_issued",
            ShutdownState::NaturallyExited => "naturally_exited",
            ShutdownState::TimedOut => "timed_out",
            ShutdownState::Terminating => "terminating",
            ShutdownState::TimedOut2 => "timed_out_2",
            ShutdownState::Killed => "killed",
            ShutdownState::Reaped => "reaped",
        };
        f.write_str(s)
    }
}

/// Where the machine starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownEntry {
    /// The command stream stopped before `quit`; send it first.
    Running,
    /// `quit` has been sent; wait for a natural exit.
    AfterQuit,
    /// Skip the natural wait and terminate straight away.
    Terminate,
}

/// Signals sent during shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSent {
    Terminate,
    Kill,
}

/// What happened during one shutdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Every state visited, in order.
    pub transitions: Vec<ShutdownState>,
    pub signals: Vec<SignalSent>,
    pub exit: Option<ExitInfo>,
    /// The natural exit wait timed out.
    pub escalated: bool,
    pub reap_error: Option<String>,
}

impl ShutdownReport {
    pub fn final_state(&self) -> Option<ShutdownState> {
        self.transitions.last().copied()
    }

    /// The child was reaped without error.
    pub fn is_clean(&self) -> bool {
        self.reap_error.is_none() && self.exit.is_some()
    }
}

/// Drives a child to a terminal shutdown state.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSupervisor {
    config: ShutdownConfig,
}

impl ShutdownSupervisor {
    pub fn new(config: ShutdownConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShutdownConfig {
        &self.config
    }

    /// Run the machine from `entry` until the child is gone.
    pub async fn shutdown<P: ChildProcess>(
        &self,
        handle: &mut ProcessHandle<P>,
        entry: ShutdownEntry,
    ) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut state = match entry {
            ShutdownEntry::Running => ShutdownState::Running,
            ShutdownEntry::AfterQuit => {
                handle.advance(ProcessState::QuitIssued);
                ShutdownState::QuitIssued
            }
            ShutdownEntry::Terminate => ShutdownState::TimedOut,
        };
        report.transitions.push(state);

        while !state.is_terminal() {
            let next = self.step(state, handle, &mut report).await;
            obs::emit_shutdown_transition(state, next);
            report.transitions.push(next);
            state = next;
        }

        if report.exit.is_none() {
            report.exit = handle.exit();
        }
        report
    }

    /// Perform the action for `state` and return the state it leads to.
    pub async fn step<P: ChildProcess>(
        &self,
        state: ShutdownState,
        handle: &mut ProcessHandle<P>,
        report: &mut ShutdownReport,
    ) -> ShutdownState {
        match state {
            ShutdownState::Running => {
                if handle.is_alive() {
                    if let Err(e) = handle.write_line(QUIT_COMMAND).await {
                        warn!(error = %e, "failed to send quit during shutdown");
                    }
                }
                handle.advance(ProcessState::QuitIssued);
                ShutdownState::QuitIssued
            }
            ShutdownState::QuitIssued => match self.wait_for_exit(handle, self.config.exit_wait()).await {
                Some(exit) => {
                    report.exit = Some(exit);
                    ShutdownState::NaturallyExited
                }
                None => {
                    report.escalated = true;
                    warn!(
                        event = "shutdown.escalation",
                        wait_secs = self.config.exit_wait().as_secs(),
                        "no exit after quit, sending terminate"
                    );
                    ShutdownState::TimedOut
                }
            },
            ShutdownState::TimedOut => {
                if let Some(exit) = self.exited(handle) {
                    report.exit = Some(exit);
                    return ShutdownState::NaturallyExited;
                }
                if let Err(e) = handle.terminate() {
                    warn!(error = %e, "terminate signal failed");
                }
                report.signals.push(SignalSent::Terminate);
                ShutdownState::Terminating
            }
            ShutdownState::Terminating => match self.wait_for_exit(handle, self.config.term_wait()).await {
                Some(exit) => {
                    report.exit = Some(exit);
                    ShutdownState::NaturallyExited
                }
                None => {
                    error!(
                        wait_secs = self.config.term_wait().as_secs(),
                        "no exit after terminate, sending kill"
                    );
                    ShutdownState::TimedOut2
                }
            },
            ShutdownState::TimedOut2 => {
                if let Some(exit) = self.exited(handle) {
                    report.exit = Some(exit);
                    return ShutdownState::NaturallyExited;
                }
                if let Err(e) = handle.kill() {
                    warn!(error = %e, "kill signal failed");
                }
                report.signals.push(SignalSent::Kill);
                ShutdownState::Killed
            }
            ShutdownState::Killed => {
                match tokio::time::timeout(self.config.reap_timeout(), handle.reap()).await {
                    Ok(Ok(exit)) => {
                        info!(exit_code = ?exit.code, "child reaped after kill");
                        report.exit = Some(exit);
                    }
                    Ok(Err(e)) => {
                        error!(event = "shutdown.reap_error", error = %e, "failed to reap child");
                        report.reap_error = Some(e.to_string());
                    }
                    Err(_) => {
                        let msg = format!(
                            "no exit status {}s after kill",
                            self.config.reap_timeout().as_secs()
                        );
                        error!(event = "shutdown.reap_error", error = %msg, "failed to reap child");
                        report.reap_error = Some(msg);
                    }
                }
                ShutdownState::Reaped
            }
            ShutdownState::NaturallyExited | ShutdownState::Reaped => state,
        }
    }

    /// Exit status if the child is already gone. Signals are never sent to an
    /// exited child.
    fn exited<P: ChildProcess>(&self, handle: &mut ProcessHandle<P>) -> Option<ExitInfo> {
        match handle.poll_exit() {
            Ok(exit) => exit,
            Err(e) => {
                warn!(error = %e, "failed to poll child status");
                None
            }
        }
    }

    /// Poll for exit until `limit` elapses.
    async fn wait_for_exit<P: ChildProcess>(
        &self,
        handle: &mut ProcessHandle<P>,
        limit: Duration,
    ) -> Option<ExitInfo> {
        let deadline = Instant::now() + limit;
        loop {
            match handle.poll_exit() {
                Ok(Some(exit)) => return Some(exit),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "failed to poll child status"),
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
        }
    }
}
