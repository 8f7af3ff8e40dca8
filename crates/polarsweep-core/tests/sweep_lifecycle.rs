//! End-to-end sweep runs against a scripted child on tokio's paused clock.

use std::path::Path;

use polarsweep_core::fakes::{FakeChild, FakeLauncher, FakeSignal};
use polarsweep_core::{
    Completion, PolarsweepConfig, RunPlan, RunRequest, RunRequestFields, ShutdownState,
    SweepRunner,
};
use tokio::time::Instant;

fn naca0012(output: &Path) -> RunRequest {
    RunRequest::new(RunRequestFields {
        airfoil: "naca0012.dat".to_string(),
        reynolds: 500_000,
        mach: 0.1,
        alpha_start: -10.0,
        alpha_end: 10.0,
        alpha_step: 2.0,
        output: output.to_path_buf(),
        debug: false,
    })
    .unwrap()
}

fn alfa_values(written: &[String]) -> Vec<f64> {
    written
        .iter()
        .filter_map(|line| line.strip_prefix("alfa "))
        .map(|v| v.parse().unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn sweep_feeds_full_sequence_and_exits_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let config = PolarsweepConfig::default();
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    let child = FakeChild::exits_on_quit().with_artifact(&output);
    let runner = SweepRunner::new(FakeLauncher::new(child.clone()), config);
    let report = runner.execute(&plan).await;

    assert!(report.success, "run failed: {:?}", report.error);
    assert_eq!(report.commands_planned, 43);
    assert_eq!(report.commands_sent, 43);

    let written = child.written();
    assert_eq!(written.len(), 43);
    assert_eq!(
        &written[..24],
        &[
            "plop",
            "G",
            "",
            "load naca0012.dat",
            "gdes",
            "cadd",
            "",
            "",
            "",
            "",
            "",
            "pane",
            "oper",
            "Re 500000",
            "mach 0.1",
            "Type 1",
            "Visc",
            "iter 500",
            "pacc",
            output.to_str().unwrap(),
            "",
            "cl -.01",
            "cl 0",
            "cl .01",
        ]
    );
    assert_eq!(&written[40..], &["pacc", "", "quit"]);

    let alfas = alfa_values(&written);
    assert_eq!(alfas.len(), 11);
    assert!(alfas.iter().all(|a| (-10.0..=10.0).contains(a)));
    assert_eq!(written.iter().filter(|l| *l == "init").count(), 5);

    assert_eq!(report.completion, Some(Completion::ProcessExited));
    let shutdown = report.shutdown.unwrap();
    assert_eq!(shutdown.final_state(), Some(ShutdownState::NaturallyExited));
    assert!(shutdown.signals.is_empty());
    assert!(child.signals().is_empty());
    assert!(shutdown.is_clean());
}

#[tokio::test(start_paused = true)]
async fn identical_requests_produce_identical_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let config = PolarsweepConfig::default();

    let first = RunPlan::sweep(&naca0012(&output), &config.sequence);
    let second = RunPlan::sweep(&naca0012(&output), &config.sequence);
    assert_eq!(first.sequence.digest(), second.sequence.digest());

    let mut written = Vec::new();
    for plan in [&first, &second] {
        let child = FakeChild::exits_on_quit().with_artifact(&output);
        let runner = SweepRunner::new(FakeLauncher::new(child.clone()), config.clone());
        let report = runner.execute(plan).await;
        assert!(report.success);
        written.push(child.written());
    }
    assert_eq!(written[0], written[1]);
}

#[tokio::test(start_paused = true)]
async fn leftover_output_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    std::fs::write(&output, "old polar rows\n").unwrap();

    let config = PolarsweepConfig::default();
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);
    let child = FakeChild::exits_on_quit().with_artifact(&output);
    let report = SweepRunner::new(FakeLauncher::new(child), config)
        .execute(&plan)
        .await;

    assert!(report.success);
    assert_eq!(std::fs::read_to_string(&output).unwrap(), "");
}

#[tokio::test(start_paused = true)]
async fn dead_process_stops_the_stream() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let config = PolarsweepConfig::default();
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    let child = FakeChild::exits_after_writes(10);
    let report = SweepRunner::new(FakeLauncher::new(child.clone()), config)
        .execute(&plan)
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("dead process"));
    assert_eq!(report.commands_sent, 10);
    assert_eq!(child.written().len(), 10);
    assert!(report.completion.is_none());

    let shutdown = report.shutdown.unwrap();
    assert_eq!(shutdown.final_state(), Some(ShutdownState::NaturallyExited));
    assert!(child.signals().is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_artifact_terminates_without_natural_wait() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let config = PolarsweepConfig::default();
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    // Ignores quit and never writes the output file.
    let child = FakeChild::exits_on_terminate();
    let report = SweepRunner::new(FakeLauncher::new(child.clone()), config)
        .execute(&plan)
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("never appeared"));
    assert_eq!(
        report.completion,
        Some(Completion::NeverAppeared { attempts: 6 })
    );
    assert_eq!(child.signals(), vec![FakeSignal::Terminate]);

    let shutdown = report.shutdown.unwrap();
    assert_eq!(
        shutdown.transitions,
        vec![
            ShutdownState::TimedOut,
            ShutdownState::Terminating,
            ShutdownState::NaturallyExited,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn child_that_quit_without_output_gets_no_signal() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let config = PolarsweepConfig::default();
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    // Exits on quit but never writes the output file.
    let child = FakeChild::exits_on_quit();
    let started = Instant::now();
    let report = SweepRunner::new(FakeLauncher::new(child.clone()), config.clone())
        .execute(&plan)
        .await;

    assert!(!report.success);
    assert_eq!(
        report.completion,
        Some(Completion::NeverAppeared { attempts: 1 })
    );
    assert!(child.signals().is_empty());

    let shutdown = report.shutdown.unwrap();
    assert!(shutdown.signals.is_empty());
    assert_eq!(
        shutdown.transitions,
        vec![ShutdownState::TimedOut, ShutdownState::NaturallyExited]
    );
    // No appearance retries once the child is gone.
    let feed_budget = config.driver.startup_delay()
        + config.driver.pacing() * 43
        + config.sequence.segment_settle() * 4
        + config.sequence.drain_settle();
    assert!(started.elapsed() < feed_budget + config.detector.appear_interval());
}

#[tokio::test(start_paused = true)]
async fn stubborn_child_is_killed_within_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let mut config = PolarsweepConfig::default();
    config.detector.max_active_wait_ms = 60_000;
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    let feed_budget = config.driver.startup_delay()
        + config.driver.pacing() * 43
        + config.sequence.segment_settle() * 4
        + config.sequence.drain_settle();
    let bound = feed_budget
        + config.detector.max_active_wait()
        + config.detector.activity_interval()
        + config.shutdown.worst_case();

    let child = FakeChild::never_exits().with_artifact(&output);
    let started = Instant::now();
    let report = SweepRunner::new(FakeLauncher::new(child.clone()), config)
        .execute(&plan)
        .await;
    let elapsed = started.elapsed();

    assert!(elapsed <= bound, "took {elapsed:?}, bound {bound:?}");
    assert_eq!(report.completion, Some(Completion::DeadlineReached));
    assert_eq!(
        child.signals(),
        vec![FakeSignal::Terminate, FakeSignal::Kill]
    );

    let shutdown = report.shutdown.unwrap();
    assert!(shutdown.escalated);
    assert_eq!(shutdown.final_state(), Some(ShutdownState::Reaped));
    assert!(shutdown.is_clean());
    // The artifact was produced and the child reaped, so the run counts.
    assert!(report.success);
}

#[tokio::test(start_paused = true)]
async fn unreapable_child_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.dat");
    let mut config = PolarsweepConfig::default();
    config.detector.max_active_wait_ms = 5_000;
    let plan = RunPlan::sweep(&naca0012(&output), &config.sequence);

    let child = FakeChild::unreapable().with_artifact(&output);
    let report = SweepRunner::new(FakeLauncher::new(child), config)
        .execute(&plan)
        .await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("reap"));
    let shutdown = report.shutdown.unwrap();
    assert_eq!(shutdown.final_state(), Some(ShutdownState::Reaped));
    assert!(shutdown.reap_error.is_some());
}
