//! Completion detection through the output artifact.
//!
//! The tool never says it is done. The only evidence available is its output
//! file: first that it exists, then that it keeps being touched. A file that
//! has not been modified for longer than the staleness threshold is taken to
//! mean the tool has finished (or stalled).

use std::path::Path;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Polling strategy for [`CompletionDetector`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Interval between existence checks (milliseconds).
    pub appear_interval_ms: u64,
    /// Maximum number of existence checks before giving up.
    pub appear_attempts: u32,
    /// Interval between activity checks once the artifact exists (milliseconds).
    pub activity_interval_ms: u64,
    /// Artifact age beyond which it is considered stale (milliseconds).
    pub staleness_ms: u64,
    /// Hard cap on the activity phase (milliseconds).
    pub max_active_wait_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            appear_interval_ms: 10_000,
            appear_attempts: 6,
            activity_interval_ms: 1_000,
            staleness_ms: 90_000,
            max_active_wait_ms: 30 * 60 * 1_000,
        }
    }
}

impl DetectorConfig {
    pub fn appear_interval(&self) -> Duration {
        Duration::from_millis(self.appear_interval_ms)
    }

    pub fn activity_interval(&self) -> Duration {
        Duration::from_millis(self.activity_interval_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.staleness_ms)
    }

    pub fn max_active_wait(&self) -> Duration {
        Duration::from_millis(self.max_active_wait_ms)
    }
}

/// Observes an artifact's age.
pub trait ArtifactProbe {
    /// Time since `path` was last modified, or `None` if it does not exist.
    fn age(&self, path: &Path) -> std::io::Result<Option<Duration>>;
}

/// Reads modification times from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsProbe;

impl ArtifactProbe for FsProbe {
    fn age(&self, path: &Path) -> std::io::Result<Option<Duration>> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            return Ok(None);
        }
        let modified = metadata.modified()?;
        // A modification time in the future counts as "just written".
        Ok(Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        ))
    }
}

/// Why the detector stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Completion {
    /// The artifact exists and the process has exited.
    ProcessExited,
    /// The artifact exists but has not been touched for longer than the threshold.
    Stale { age_ms: u64 },
    /// The activity phase hit its hard cap while the artifact was still fresh.
    DeadlineReached,
    /// The artifact never appeared within the retry budget.
    NeverAppeared { attempts: u32 },
}

impl Completion {
    /// `true` when the artifact was produced.
    pub fn artifact_present(&self) -> bool {
        !matches!(self, Completion::NeverAppeared { .. })
    }
}

/// Polls an artifact until the run can be considered finished.
#[derive(Debug, Clone)]
pub struct CompletionDetector<A = FsProbe> {
    probe: A,
    config: DetectorConfig,
}

impl CompletionDetector<FsProbe> {
    pub fn new(config: DetectorConfig) -> Self {
        Self::with_probe(FsProbe, config)
    }
}

impl<A: ArtifactProbe> CompletionDetector<A> {
    pub fn with_probe(probe: A, config: DetectorConfig) -> Self {
        Self { probe, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Wait for `path` to appear and then to stop changing.
    ///
    /// `is_alive` is polled in both phases; once it reports the process gone,
    /// waiting stops. Every phase is bounded.
    pub async fn wait_for_completion<F>(&self, path: &Path, mut is_alive: F) -> Completion
    where
        F: FnMut() -> bool,
    {
        if let Some(attempts) = self.wait_for_appearance(path, &mut is_alive).await {
            return Completion::NeverAppeared { attempts };
        }
        info!(path = %path.display(), "output artifact present, watching for activity");

        let deadline = tokio::time::Instant::now() + self.config.max_active_wait();
        loop {
            if !is_alive() {
                debug!("process exited, artifact settled");
                return Completion::ProcessExited;
            }

            match self.probe.age(path) {
                Ok(Some(age)) if age > self.config.staleness() => {
                    warn!(
                        path = %path.display(),
                        age_secs = age.as_secs(),
                        "artifact stale while process still running"
                    );
                    return Completion::Stale {
                        age_ms: age.as_millis() as u64,
                    };
                }
                Ok(Some(_)) => {}
                Ok(None) => warn!(path = %path.display(), "artifact disappeared while watching"),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to read artifact age"),
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    path = %path.display(),
                    limit_secs = self.config.max_active_wait().as_secs(),
                    "artifact still active at hard deadline"
                );
                return Completion::DeadlineReached;
            }
            tokio::time::sleep(self.config.activity_interval()).await;
        }
    }

    /// Returns `None` once the file exists, or the number of failed attempts.
    /// Gives up early when the process has exited without producing it.
    async fn wait_for_appearance<F>(&self, path: &Path, is_alive: &mut F) -> Option<u32>
    where
        F: FnMut() -> bool,
    {
        for attempt in 1..=self.config.appear_attempts {
            match self.probe.age(path) {
                Ok(Some(_)) => return None,
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to probe artifact"),
            }
            if !is_alive() {
                // The file may have landed between the probe and the exit.
                if let Ok(Some(_)) = self.probe.age(path) {
                    return None;
                }
                warn!(
                    path = %path.display(),
                    attempt = attempt,
                    "process exited before the output artifact appeared"
                );
                return Some(attempt);
            }
            warn!(
                path = %path.display(),
                attempt = attempt,
                wait_secs = self.config.appear_interval().as_secs(),
                "output artifact not found, waiting"
            );
            tokio::time::sleep(self.config.appear_interval()).await;
        }

        // One last look after the final sleep.
        match self.probe.age(path) {
            Ok(Some(_)) => None,
            _ => Some(self.config.appear_attempts),
        }
    }
}
