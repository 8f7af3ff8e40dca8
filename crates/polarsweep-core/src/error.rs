//! Error taxonomy for polarsweep runs.

use std::path::PathBuf;

/// Violations found while validating a run or generation request.
///
/// These are always reported before any process is spawned.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("airfoil name must not be empty")]
    EmptyAirfoil,

    #[error("Reynolds number must be positive, got {0}")]
    NonPositiveReynolds(i64),

    #[error("Mach number must lie in (0, 1), got {0}")]
    MachOutOfRange(f64),

    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    #[error("alpha step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("alpha span |{end} - {start}| is smaller than step {step}")]
    SpanSmallerThanStep { start: f64, end: f64, step: f64 },

    #[error("output path {0:?} must carry a file extension (4 characters minimum)")]
    MissingExtension(PathBuf),

    #[error("NACA designation must be a 4-digit number, got {0}")]
    InvalidDesignation(u32),
}

/// Errors produced while driving or supervising the external tool.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("invalid parameter: {0}")]
    Parameter(#[from] ParameterError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dead process cannot accept command {command:?}")]
    DeadProcess { command: String },

    #[error("output artifact {path:?} never appeared after {attempts} attempt(s)")]
    ArtifactTimeout { path: PathBuf, attempts: u32 },

    #[error("failed to reap child process: {0}")]
    Reap(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for polarsweep operations.
pub type Result<T> = std::result::Result<T, SweepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_error_display() {
        let err = ParameterError::MachOutOfRange(1.5);
        assert!(err.to_string().contains("(0, 1)"));

        let err = ParameterError::SpanSmallerThanStep {
            start: 0.0,
            end: 1.0,
            step: 2.0,
        };
        assert!(err.to_string().contains("smaller than step 2"));
    }

    #[test]
    fn test_parameter_error_converts_into_sweep_error() {
        let err: SweepError = ParameterError::NonPositiveReynolds(-3).into();
        assert!(matches!(err, SweepError::Parameter(_)));
        assert!(err.to_string().contains("invalid parameter"));
    }

    #[test]
    fn test_dead_process_mentions_command() {
        let err = SweepError::DeadProcess {
            command: "alfa 2.00".to_string(),
        };
        assert!(err.to_string().contains("alfa 2.00"));
    }
}
