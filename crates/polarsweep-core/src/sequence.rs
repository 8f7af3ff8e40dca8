//! Command sequencing for the XFOIL command pipe.
//!
//! The tool gives no acknowledgement on its input channel, so the entire
//! protocol is the order and exact text of the lines sent. Everything in this
//! module is a pure function of its inputs; side effects such as deleting a
//! stale output file are expressed as [`Step`] markers that the executor
//! performs in place.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::SequenceConfig;
use crate::request::{AlphaSweep, RunRequest};

/// Text of the final command; sending it moves the child to `QuitIssued`.
pub const QUIT_COMMAND: &str = "quit";

/// Solver re-initialisation command.
pub const REINIT_COMMAND: &str = "init";

/// Which configured settle pause to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseKind {
    /// After each sweep quarter-segment.
    Segment,
    /// Before accumulation is closed.
    Drain,
}

/// One entry of a [`CommandSequence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    /// Write this line to the tool.
    Send(String),
    /// Delete the file at this path if it exists.
    ResetArtifact(PathBuf),
    /// Sleep for the configured pause of this kind.
    Pause(PauseKind),
    /// Send [`QUIT_COMMAND`].
    Quit,
}

impl Step {
    /// The line this step writes to the tool, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            Step::Send(text) => Some(text),
            Step::Quit => Some(QUIT_COMMAND),
            Step::ResetArtifact(_) | Step::Pause(_) => None,
        }
    }
}

/// Ordered steps for one run. Order is the contract: nothing is reordered
/// or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSequence {
    steps: Vec<Step>,
}

impl CommandSequence {
    pub fn builder() -> SequenceBuilder {
        SequenceBuilder::default()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Command lines only, in send order.
    pub fn commands(&self) -> Vec<&str> {
        self.steps.iter().filter_map(Step::command).collect()
    }

    /// Number of lines that will be written to the tool.
    pub fn command_count(&self) -> usize {
        self.steps.iter().filter(|s| s.command().is_some()).count()
    }

    /// SHA256 hex digest of the newline-terminated command text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for command in self.commands() {
            hasher.update(command.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a CommandSequence {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// Incremental builder for a [`CommandSequence`].
#[derive(Debug, Default)]
pub struct SequenceBuilder {
    steps: Vec<Step>,
}

impl SequenceBuilder {
    pub fn send(mut self, command: impl Into<String>) -> Self {
        self.steps.push(Step::Send(command.into()));
        self
    }

    pub fn send_all<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.steps
            .extend(commands.into_iter().map(|c| Step::Send(c.into())));
        self
    }

    pub fn reset_artifact(mut self, path: &Path) -> Self {
        self.steps.push(Step::ResetArtifact(path.to_path_buf()));
        self
    }

    pub fn pause(mut self, kind: PauseKind) -> Self {
        self.steps.push(Step::Pause(kind));
        self
    }

    pub fn quit(mut self) -> Self {
        self.steps.push(Step::Quit);
        self
    }

    pub fn build(self) -> CommandSequence {
        CommandSequence { steps: self.steps }
    }
}

/// Commands that turn off the graphics window. Skipped in debug runs.
pub(crate) fn plotting_off(builder: SequenceBuilder, debug: bool) -> SequenceBuilder {
    if debug {
        builder
    } else {
        builder.send_all(["plop", "G", ""])
    }
}

/// Build the full command sequence for a polar sweep.
pub fn build_sequence(request: &RunRequest, options: &SequenceConfig) -> CommandSequence {
    let mut b = plotting_off(CommandSequence::builder(), request.debug());

    // Load and repanel.
    b = b
        .send(format!("load {}", request.airfoil()))
        .send_all(["gdes", "cadd", "", "", "", "", "", "pane"]);

    b = b.send_all([
        "oper".to_string(),
        format!("Re {}", request.reynolds()),
        format!("mach {}", request.mach()),
        "Type 1".to_string(),
        "Visc".to_string(),
        format!("iter {}", options.iterations),
    ]);

    // Accumulation starts from an empty file.
    b = b
        .send("pacc")
        .reset_artifact(request.output())
        .send(request.output().display().to_string())
        .send("");

    b = b.send_all(["cl -.01", "cl 0", "cl .01"]);

    let mut emitted = 0usize;
    let segments = sweep_segments(request.alpha());
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            b = b.send(REINIT_COMMAND);
        }
        for &alpha in segment {
            b = b.send(format!("alfa {}", format_angle(alpha)));
            emitted += 1;
            if options.reinit_every > 0 && emitted % options.reinit_every == 0 {
                b = b.send(REINIT_COMMAND);
            }
        }
        b = b.pause(PauseKind::Segment);
    }

    b.pause(PauseKind::Drain)
        .send_all(["pacc", ""])
        .quit()
        .build()
}

/// Sweep angles in send order.
pub fn sweep_angles(alpha: AlphaSweep) -> Vec<f64> {
    sweep_segments(alpha).into_iter().flatten().collect()
}

/// Non-empty quarter-segments in send order: the inner quarters of the half
/// toward `end` and of the half toward `start`, then the outer quarters in the
/// same order. The center is sent once, at the head of the first segment.
pub fn sweep_segments(alpha: AlphaSweep) -> Vec<Vec<f64>> {
    let center = alpha.center();

    let toward_end = half_walk(center, alpha.end, alpha.step);
    let toward_start: Vec<f64> = half_walk(center, alpha.start, alpha.step)
        .into_iter()
        .skip(1)
        .collect();

    let (end_inner, end_outer) = split_at_quarter(toward_end, center, alpha.end, alpha.step);
    let (start_inner, start_outer) =
        split_at_quarter(toward_start, center, alpha.start, alpha.step);

    [end_inner, start_inner, end_outer, start_outer]
        .into_iter()
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Walk from `center` toward `bound` on the lattice `center ± k·step`.
///
/// The first value is `center`; the walk stops once the next value would
/// cross `bound`, and `bound` itself is included when it lies on the lattice.
/// A degenerate step yields only the center.
pub fn half_walk(center: f64, bound: f64, step: f64) -> Vec<f64> {
    if !(step.is_finite() && step > 0.0) || !center.is_finite() || !bound.is_finite() {
        return vec![center];
    }

    let direction = if bound >= center { 1.0 } else { -1.0 };
    let tolerance = step * 1e-9;

    let mut values = Vec::new();
    let mut k = 0u64;
    loop {
        let value = center + direction * (k as f64) * step;
        let overshoot = direction * (value - bound);
        if overshoot > tolerance {
            break;
        }
        let value = if overshoot > 0.0 { bound } else { value };
        values.push(if value.abs() < tolerance { 0.0 } else { value });
        k += 1;
    }
    values
}

fn split_at_quarter(values: Vec<f64>, center: f64, bound: f64, step: f64) -> (Vec<f64>, Vec<f64>) {
    let quarter = (center + bound) / 2.0;
    let direction = if bound >= center { 1.0 } else { -1.0 };
    let tolerance = step.abs() * 1e-9;
    values
        .into_iter()
        .partition(|v| direction * (v - quarter) <= tolerance)
}

/// Format an angle to three significant digits, keeping trailing zeros
/// (`2.00`, `-2.00`, `10.0`, `0.500`). Magnitudes of 1000 and above print as
/// rounded integers.
pub fn format_angle(value: f64) -> String {
    const SIGNIFICANT: i32 = 3;

    if value == 0.0 {
        return "0.00".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let exponent = value.abs().log10().floor() as i32;
    let mut decimals = (SIGNIFICANT - 1 - exponent).max(0) as usize;
    let mut text = format!("{:.*}", decimals, value);

    // Rounding can carry into the next decade (9.996 -> 10.00).
    let rounded: f64 = text.parse().unwrap_or(value);
    if decimals > 0 && rounded.abs() >= 10f64.powi(exponent + 1) {
        decimals -= 1;
        text = format!("{:.*}", decimals, value);
    }
    text
}
