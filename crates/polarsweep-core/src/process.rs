//! Child process seam and lifecycle tracking.
//!
//! [`ChildProcess`] is the minimal surface the driver and supervisor need from
//! a running tool. [`ToolProcess`] implements it over `tokio::process`; tests
//! substitute recording doubles. [`ProcessHandle`] wraps either one with the
//! one-directional lifecycle state and caches the exit status so the child is
//! reaped exactly once.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::config::ToolConfig;
use crate::error::{Result, SweepError};

/// Exit information observed for a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitInfo {
    /// Exit code, `None` when the child was ended by a signal.
    pub code: Option<i32>,
}

impl ExitInfo {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ExitInfo {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Operations the pipeline performs on a running tool.
#[async_trait]
pub trait ChildProcess: Send {
    /// OS process id, if still known.
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check. Returns the exit once the child has ended.
    fn try_wait(&mut self) -> std::io::Result<Option<ExitInfo>>;

    /// Write `line` plus a line terminator to stdin and flush.
    async fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Ask the child to terminate (SIGTERM on unix).
    fn terminate(&mut self) -> std::io::Result<()>;

    /// Forcefully kill the child (SIGKILL on unix).
    fn kill(&mut self) -> std::io::Result<()>;

    /// Block until the child exits and collect its status.
    async fn wait(&mut self) -> std::io::Result<ExitInfo>;
}

/// Lifecycle of the supervised child. Ordered; transitions never go back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Spawned,
    Running,
    QuitIssued,
    Terminating,
    Killed,
    Exited,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Spawned => "spawned",
            ProcessState::Running => "running",
            ProcessState::QuitIssued => "quit_issued",
            ProcessState::Terminating => "terminating",
            ProcessState::Killed => "killed",
            ProcessState::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Exclusive owner of one child and its input stream for a run.
pub struct ProcessHandle<P> {
    child: P,
    state: ProcessState,
    exit: Option<ExitInfo>,
}

impl<P: ChildProcess> ProcessHandle<P> {
    pub fn new(child: P) -> Self {
        Self {
            child,
            state: ProcessState::Spawned,
            exit: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Exit status, once it has been collected.
    pub fn exit(&self) -> Option<ExitInfo> {
        self.exit
    }

    /// Move forward to `next`. Returns `false` (and stays put) for backward moves.
    pub fn advance(&mut self, next: ProcessState) -> bool {
        if next < self.state {
            tracing::warn!(from = %self.state, to = %next, "ignoring backward process transition");
            return false;
        }
        self.state = next;
        true
    }

    /// Poll the child without blocking. Collects the exit status the first
    /// time the child is seen to have ended.
    pub fn poll_exit(&mut self) -> std::io::Result<Option<ExitInfo>> {
        if let Some(exit) = self.exit {
            return Ok(Some(exit));
        }
        match self.child.try_wait()? {
            Some(exit) => {
                self.record_exit(exit);
                Ok(Some(exit))
            }
            None => Ok(None),
        }
    }

    /// `true` while the child has not been observed to exit. A failed poll
    /// counts as alive so callers keep supervising it.
    pub fn is_alive(&mut self) -> bool {
        match self.poll_exit() {
            Ok(exit) => exit.is_none(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to poll child status");
                true
            }
        }
    }

    /// Write one line to the child. Fails with `DeadProcess` once exited.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        if self.state == ProcessState::Exited {
            return Err(SweepError::DeadProcess {
                command: line.to_string(),
            });
        }
        if self.state == ProcessState::Spawned {
            self.state = ProcessState::Running;
        }
        self.child.write_line(line).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => SweepError::DeadProcess {
                command: line.to_string(),
            },
            _ => SweepError::Io(e),
        })
    }

    pub fn terminate(&mut self) -> std::io::Result<()> {
        self.advance(ProcessState::Terminating);
        self.child.terminate()
    }

    pub fn kill(&mut self) -> std::io::Result<()> {
        self.advance(ProcessState::Killed);
        self.child.kill()
    }

    /// Blocking reap. Returns the cached status if it was already collected.
    pub async fn reap(&mut self) -> std::io::Result<ExitInfo> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let exit = self.child.wait().await?;
        self.record_exit(exit);
        Ok(exit)
    }

    pub fn into_inner(self) -> P {
        self.child
    }

    fn record_exit(&mut self, exit: ExitInfo) {
        self.exit = Some(exit);
        self.state = ProcessState::Exited;
    }
}

/// Starts the external tool. Implemented by [`ToolLauncher`] and test doubles.
pub trait Launcher {
    type Child: ChildProcess;

    /// Spawn the tool. `quiet` discards its stdout.
    fn launch(&self, quiet: bool) -> Result<Self::Child>;
}

/// Spawns the configured executable with piped stdin.
#[derive(Debug, Clone)]
pub struct ToolLauncher {
    config: ToolConfig,
}

impl ToolLauncher {
    pub fn new(config: ToolConfig) -> Self {
        Self { config }
    }

    pub fn program(&self) -> &str {
        &self.config.program
    }
}

impl Launcher for ToolLauncher {
    type Child = ToolProcess;

    fn launch(&self, quiet: bool) -> Result<ToolProcess> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(if quiet { Stdio::null() } else { Stdio::inherit() })
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SweepError::Spawn {
                program: self.config.program.clone(),
                source,
            })?;

        let stdin = child.stdin.take();
        Ok(ToolProcess { child, stdin })
    }
}

/// A spawned tool backed by `tokio::process::Child`.
#[derive(Debug)]
pub struct ToolProcess {
    child: Child,
    stdin: Option<ChildStdin>,
}

#[async_trait]
impl ChildProcess for ToolProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitInfo>> {
        Ok(self.child.try_wait()?.map(ExitInfo::from))
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdin = self.stdin.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "stdin already closed")
        })?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = self.child.id().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "child already reaped")
            })?;
            kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(std::io::Error::from)
        }

        #[cfg(not(unix))]
        {
            self.child.start_kill()
        }
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> std::io::Result<ExitInfo> {
        // Close stdin first so a child blocked on input can see EOF.
        self.stdin.take();
        Ok(self.child.wait().await?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FakeChild;

    #[test]
    fn test_state_order_is_one_directional() {
        assert!(ProcessState::Spawned < ProcessState::Running);
        assert!(ProcessState::QuitIssued < ProcessState::Terminating);
        assert!(ProcessState::Killed < ProcessState::Exited);
    }

    #[test]
    fn test_advance_refuses_backward_move() {
        let mut handle = ProcessHandle::new(FakeChild::never_exits());
        assert!(handle.advance(ProcessState::QuitIssued));
        assert!(!handle.advance(ProcessState::Running));
        assert_eq!(handle.state(), ProcessState::QuitIssued);
    }

    #[tokio::test]
    async fn test_first_write_marks_running() {
        let mut handle = ProcessHandle::new(FakeChild::never_exits());
        handle.write_line("oper").await.unwrap();
        assert_eq!(handle.state(), ProcessState::Running);
        assert_eq!(handle.into_inner().written(), vec!["oper".to_string()]);
    }

    #[tokio::test]
    async fn test_exit_is_collected_once() {
        let fake = FakeChild::exits_after_writes(0);
        let mut handle = ProcessHandle::new(fake.clone());
        assert_eq!(handle.poll_exit().unwrap(), Some(ExitInfo { code: Some(0) }));
        assert_eq!(handle.state(), ProcessState::Exited);

        // Later polls and reaps come from the cache.
        handle.poll_exit().unwrap();
        handle.reap().await.unwrap();
        assert_eq!(fake.status_reads(), 1);
    }

    #[tokio::test]
    async fn test_write_after_exit_is_dead_process() {
        let mut handle = ProcessHandle::new(FakeChild::exits_after_writes(0));
        handle.poll_exit().unwrap();
        let err = handle.write_line("alfa 2.00").await.unwrap_err();
        assert!(matches!(err, SweepError::DeadProcess { .. }));
    }

    #[tokio::test]
    async fn test_launch_missing_program_is_spawn_error() {
        let launcher = ToolLauncher::new(ToolConfig {
            program: "/nonexistent/polarsweep-tool".to_string(),
            args: Vec::new(),
        });
        match launcher.launch(true) {
            Err(SweepError::Spawn { program, .. }) => {
                assert_eq!(program, "/nonexistent/polarsweep-tool")
            }
            other => panic!("expected Spawn error, got {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_process_round_trip_through_cat() {
        let launcher = ToolLauncher::new(ToolConfig {
            program: "cat".to_string(),
            args: Vec::new(),
        });
        let mut handle = ProcessHandle::new(launcher.launch(true).unwrap());
        handle.write_line("quit").await.unwrap();
        assert!(handle.is_alive());

        // cat exits on EOF once stdin is closed by reap.
        let exit = handle.reap().await.unwrap();
        assert!(exit.success());
        assert_eq!(handle.state(), ProcessState::Exited);
    }
}
