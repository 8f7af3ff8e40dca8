//! In-memory child process double (testing only)
//!
//! `FakeChild` satisfies [`ChildProcess`] without spawning anything. It records
//! every line and signal it receives and exits according to a scripted
//! behaviour, which makes driver and supervisor paths deterministic under
//! tokio's paused clock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::process::{ChildProcess, ExitInfo, Launcher};
use crate::sequence::QUIT_COMMAND;

/// Signals delivered to a [`FakeChild`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeSignal {
    Terminate,
    Kill,
}

/// How a [`FakeChild`] reacts to its input and to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Exits with code 0 once this many lines have been written.
    ExitAfterWrites(usize),
    /// Exits with code 0 when `quit` is written.
    ExitOnQuit,
    /// Ignores `quit`; exits on the terminate signal.
    ExitOnTerminate,
    /// Ignores `quit` and terminate; only kill ends it.
    NeverExits,
    /// Like `NeverExits`, but collecting the status after kill fails.
    Unreapable,
}

#[derive(Debug)]
struct FakeState {
    behavior: FakeBehavior,
    written: Vec<String>,
    signals: Vec<FakeSignal>,
    exit: Option<ExitInfo>,
    status_reads: usize,
    artifact: Option<PathBuf>,
}

/// Scripted child process. Clones share state, so a test can keep one clone
/// for inspection while the pipeline owns another.
#[derive(Debug, Clone)]
pub struct FakeChild {
    state: Arc<Mutex<FakeState>>,
}

impl FakeChild {
    pub fn new(behavior: FakeBehavior) -> Self {
        let exit = match behavior {
            FakeBehavior::ExitAfterWrites(0) => Some(ExitInfo { code: Some(0) }),
            _ => None,
        };
        Self {
            state: Arc::new(Mutex::new(FakeState {
                behavior,
                written: Vec::new(),
                signals: Vec::new(),
                exit,
                status_reads: 0,
                artifact: None,
            })),
        }
    }

    pub fn exits_after_writes(n: usize) -> Self {
        Self::new(FakeBehavior::ExitAfterWrites(n))
    }

    pub fn exits_on_quit() -> Self {
        Self::new(FakeBehavior::ExitOnQuit)
    }

    pub fn exits_on_terminate() -> Self {
        Self::new(FakeBehavior::ExitOnTerminate)
    }

    pub fn never_exits() -> Self {
        Self::new(FakeBehavior::NeverExits)
    }

    pub fn unreapable() -> Self {
        Self::new(FakeBehavior::Unreapable)
    }

    /// Create `path` (empty) when that path is written as a line, the way the
    /// tool opens its accumulation file.
    pub fn with_artifact(self, path: impl Into<PathBuf>) -> Self {
        self.lock().artifact = Some(path.into());
        self
    }

    /// Lines written so far, in order.
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Signals received so far, in order.
    pub fn signals(&self) -> Vec<FakeSignal> {
        self.lock().signals.clone()
    }

    /// How many times an exit status was handed out.
    pub fn status_reads(&self) -> usize {
        self.lock().status_reads
    }

    pub fn has_exited(&self) -> bool {
        self.lock().exit.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl ChildProcess for FakeChild {
    fn id(&self) -> Option<u32> {
        if self.has_exited() {
            None
        } else {
            Some(4242)
        }
    }

    fn try_wait(&mut self) -> std::io::Result<Option<ExitInfo>> {
        let mut state = self.lock();
        if state.exit.is_some() {
            state.status_reads += 1;
        }
        Ok(state.exit)
    }

    async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let mut state = self.lock();
        if state.exit.is_some() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "fake child has exited",
            ));
        }
        state.written.push(line.to_string());

        if let Some(artifact) = &state.artifact {
            if artifact.as_os_str() == line {
                std::fs::write(artifact, b"")?;
            }
        }

        let exits = match state.behavior {
            FakeBehavior::ExitAfterWrites(n) => state.written.len() >= n,
            FakeBehavior::ExitOnQuit => line == QUIT_COMMAND,
            _ => false,
        };
        if exits {
            state.exit = Some(ExitInfo { code: Some(0) });
        }
        Ok(())
    }

    fn terminate(&mut self) -> std::io::Result<()> {
        let mut state = self.lock();
        state.signals.push(FakeSignal::Terminate);
        if state.exit.is_none() && state.behavior == FakeBehavior::ExitOnTerminate {
            state.exit = Some(ExitInfo { code: None });
        }
        Ok(())
    }

    fn kill(&mut self) -> std::io::Result<()> {
        let mut state = self.lock();
        state.signals.push(FakeSignal::Kill);
        if state.exit.is_none() && state.behavior != FakeBehavior::Unreapable {
            state.exit = Some(ExitInfo { code: None });
        }
        Ok(())
    }

    async fn wait(&mut self) -> std::io::Result<ExitInfo> {
        loop {
            {
                let mut state = self.lock();
                if let Some(exit) = state.exit {
                    state.status_reads += 1;
                    return Ok(exit);
                }
                if state.behavior == FakeBehavior::Unreapable
                    && state.signals.contains(&FakeSignal::Kill)
                {
                    return Err(std::io::Error::other("fake child cannot be reaped"));
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Launcher that hands out clones of one [`FakeChild`], or fails to spawn.
#[derive(Debug, Clone)]
pub struct FakeLauncher {
    child: Option<FakeChild>,
    launches: Arc<Mutex<Vec<bool>>>,
}

impl FakeLauncher {
    pub fn new(child: FakeChild) -> Self {
        Self {
            child: Some(child),
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A launcher whose spawn always fails.
    pub fn failing() -> Self {
        Self {
            child: None,
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The `quiet` flag of every launch attempt.
    pub fn launches(&self) -> Vec<bool> {
        self.launches.lock().unwrap().clone()
    }
}

impl Launcher for FakeLauncher {
    type Child = FakeChild;

    fn launch(&self, quiet: bool) -> Result<FakeChild> {
        self.launches.lock().unwrap().push(quiet);
        self.child
            .clone()
            .ok_or_else(|| crate::error::SweepError::Spawn {
                program: "fake-tool".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such tool"),
            })
    }
}
