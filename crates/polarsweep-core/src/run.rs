//! One supervised run: spawn, feed, detect completion, shut down.
//!
//! [`SweepRunner::execute`] never returns an error. Every failure is logged
//! and folded into the [`RunReport`], and every spawned child is driven to a
//! terminal shutdown state before the report is returned.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{PolarsweepConfig, SequenceConfig};
use crate::detector::{Completion, CompletionDetector, FsProbe};
use crate::driver::PipeDriver;
use crate::error::{Result, SweepError};
use crate::obs::{self, RunSpan};
use crate::process::{ChildProcess, Launcher, ProcessHandle, ProcessState};
use crate::request::RunRequest;
use crate::sequence::{build_sequence, CommandSequence, PauseKind, Step, QUIT_COMMAND};
use crate::supervisor::{ShutdownEntry, ShutdownReport, ShutdownSupervisor};

/// Everything needed to execute one run against the tool.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Human-readable name for logs and reports.
    pub label: String,
    pub sequence: CommandSequence,
    /// File whose appearance and activity signal completion.
    pub artifact: PathBuf,
    pub debug: bool,
}

impl RunPlan {
    /// Plan a polar sweep for a validated request.
    pub fn sweep(request: &RunRequest, options: &SequenceConfig) -> Self {
        Self {
            label: request.airfoil().to_string(),
            sequence: build_sequence(request, options),
            artifact: request.output().to_path_buf(),
            debug: request.debug(),
        }
    }
}

/// Outcome of a run, suitable for writing as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub run_id: Uuid,
    pub label: String,
    pub artifact: PathBuf,
    pub sequence_digest: String,
    pub commands_planned: usize,
    pub commands_sent: u64,
    pub completion: Option<Completion>,
    pub shutdown: Option<ShutdownReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// The run was not attempted because its artifact already exists.
    pub skipped: bool,
    pub success: bool,
    pub error: Option<String>,
}

impl RunReport {
    fn new(run_id: Uuid, plan: &RunPlan) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            label: plan.label.clone(),
            artifact: plan.artifact.clone(),
            sequence_digest: plan.sequence.digest(),
            commands_planned: plan.sequence.command_count(),
            commands_sent: 0,
            completion: None,
            shutdown: None,
            started_at: now,
            finished_at: now,
            skipped: false,
            success: false,
            error: None,
        }
    }

    /// Report for a run that was not needed.
    pub fn skipped(plan: &RunPlan) -> Self {
        let mut report = Self::new(Uuid::new_v4(), plan);
        report.skipped = true;
        report.success = true;
        report
    }

    /// Write the report as pretty JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| SweepError::Io(std::io::Error::other(e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Runs plans against tools spawned by a [`Launcher`].
pub struct SweepRunner<L, A = FsProbe> {
    launcher: L,
    config: PolarsweepConfig,
    detector: CompletionDetector<A>,
    supervisor: ShutdownSupervisor,
}

impl<L: Launcher> SweepRunner<L, FsProbe> {
    pub fn new(launcher: L, config: PolarsweepConfig) -> Self {
        let detector = CompletionDetector::new(config.detector.clone());
        let supervisor = ShutdownSupervisor::new(config.shutdown.clone());
        Self {
            launcher,
            config,
            detector,
            supervisor,
        }
    }
}

impl<L: Launcher, A: crate::detector::ArtifactProbe> SweepRunner<L, A> {
    /// Replace the artifact probe.
    pub fn with_probe<B: crate::detector::ArtifactProbe>(self, probe: B) -> SweepRunner<L, B> {
        SweepRunner {
            detector: CompletionDetector::with_probe(probe, self.config.detector.clone()),
            launcher: self.launcher,
            config: self.config,
            supervisor: self.supervisor,
        }
    }

    pub fn config(&self) -> &PolarsweepConfig {
        &self.config
    }

    /// Execute `plan` end to end.
    pub async fn execute(&self, plan: &RunPlan) -> RunReport {
        let run_id = Uuid::new_v4();
        let _span = RunSpan::enter(&run_id.to_string(), &plan.label);
        let clock = Instant::now();
        let mut report = RunReport::new(run_id, plan);

        obs::emit_run_started(
            &run_id.to_string(),
            &plan.label,
            report.commands_planned,
            &report.sequence_digest,
        );

        let failure = match self.launcher.launch(!plan.debug) {
            Ok(child) => self.supervise(child, plan, &mut report).await,
            Err(e) => Some(e),
        };

        report.finished_at = Utc::now();
        report.success = failure.is_none();
        if let Some(e) = &failure {
            obs::emit_run_failed(&run_id.to_string(), e);
            report.error = Some(e.to_string());
        }
        obs::emit_run_finished(
            &run_id.to_string(),
            clock.elapsed().as_millis() as u64,
            report.commands_sent,
            report.success,
        );
        report
    }

    /// Drive a spawned child through the plan and shut it down. Returns the
    /// first failure, if any.
    async fn supervise<C: ChildProcess>(
        &self,
        child: C,
        plan: &RunPlan,
        report: &mut RunReport,
    ) -> Option<SweepError> {
        let mut handle = ProcessHandle::new(child);
        obs::emit_child_spawned(handle.id());

        tokio::time::sleep(self.config.driver.startup_delay()).await;

        let mut driver = PipeDriver::from_config(&self.config.driver, plan.debug);
        let fed = self.feed(&mut driver, &mut handle, plan).await;
        report.commands_sent = driver.sent();

        let (entry, mut failure) = match fed {
            Ok(()) => {
                let completion = self
                    .detector
                    .wait_for_completion(&plan.artifact, || handle.is_alive())
                    .await;
                report.completion = Some(completion);
                info!(verdict = ?completion, "completion detected");
                match completion {
                    Completion::NeverAppeared { attempts } => {
                        tracing::error!(path = %plan.artifact.display(), "no output artifact generated, terminating");
                        (
                            ShutdownEntry::Terminate,
                            Some(SweepError::ArtifactTimeout {
                                path: plan.artifact.clone(),
                                attempts,
                            }),
                        )
                    }
                    _ => (ShutdownEntry::AfterQuit, None),
                }
            }
            Err(e @ SweepError::DeadProcess { .. }) => (ShutdownEntry::AfterQuit, Some(e)),
            // The tool may be sitting at a prompt that would read `quit` as input.
            Err(e) => (ShutdownEntry::Terminate, Some(e)),
        };

        let shutdown = self.supervisor.shutdown(&mut handle, entry).await;
        if let Some(msg) = &shutdown.reap_error {
            failure.get_or_insert_with(|| SweepError::Reap(msg.clone()));
        }
        report.shutdown = Some(shutdown);
        failure
    }

    async fn feed<C: ChildProcess>(
        &self,
        driver: &mut PipeDriver,
        handle: &mut ProcessHandle<C>,
        plan: &RunPlan,
    ) -> Result<()> {
        for step in &plan.sequence {
            match step {
                Step::Send(command) => driver.issue(handle, command).await?,
                Step::ResetArtifact(path) => reset_artifact(path)?,
                Step::Pause(kind) => tokio::time::sleep(self.pause(*kind)).await,
                Step::Quit => {
                    driver.issue(handle, QUIT_COMMAND).await?;
                    handle.advance(ProcessState::QuitIssued);
                    obs::emit_quit_issued(driver.sent());
                }
            }
        }
        Ok(())
    }

    fn pause(&self, kind: PauseKind) -> std::time::Duration {
        match kind {
            PauseKind::Segment => self.config.sequence.segment_settle(),
            PauseKind::Drain => self.config.sequence.drain_settle(),
        }
    }
}

/// Remove a leftover artifact so accumulation starts from an empty file.
fn reset_artifact(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            warn!(path = %path.display(), "output already exists, deleted");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
