//! Validated run request for one polar sweep.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

/// Raw, unvalidated inputs for a [`RunRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRequestFields {
    pub airfoil: String,
    pub reynolds: i64,
    pub mach: f64,
    pub alpha_start: f64,
    pub alpha_end: f64,
    pub alpha_step: f64,
    pub output: PathBuf,
    pub debug: bool,
}

/// Angle-of-attack sweep bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlphaSweep {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl AlphaSweep {
    /// Midpoint of the sweep; both halves are walked outward from here.
    pub fn center(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// An immutable, validated request to run one polar sweep.
///
/// Construction is the only place parameters are checked, so every
/// `RunRequest` that exists is safe to hand to the sequencer.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RunRequest {
    airfoil: String,
    reynolds: u64,
    mach: f64,
    alpha: AlphaSweep,
    output: PathBuf,
    debug: bool,
}

impl RunRequest {
    /// Validate `fields` and build a request, failing on the first violation.
    pub fn new(fields: RunRequestFields) -> Result<Self, ParameterError> {
        if fields.airfoil.trim().is_empty() {
            return Err(ParameterError::EmptyAirfoil);
        }

        if fields.reynolds <= 0 {
            return Err(ParameterError::NonPositiveReynolds(fields.reynolds));
        }

        if !fields.mach.is_finite() {
            return Err(ParameterError::NonFinite { field: "mach" });
        }
        if fields.mach <= 0.0 || fields.mach >= 1.0 {
            return Err(ParameterError::MachOutOfRange(fields.mach));
        }

        for (field, value) in [
            ("alpha_start", fields.alpha_start),
            ("alpha_end", fields.alpha_end),
            ("alpha_step", fields.alpha_step),
        ] {
            if !value.is_finite() {
                return Err(ParameterError::NonFinite { field });
            }
        }
        if fields.alpha_step <= 0.0 {
            return Err(ParameterError::NonPositiveStep(fields.alpha_step));
        }
        if (fields.alpha_end - fields.alpha_start).abs() < fields.alpha_step {
            return Err(ParameterError::SpanSmallerThanStep {
                start: fields.alpha_start,
                end: fields.alpha_end,
                step: fields.alpha_step,
            });
        }

        validate_output_path(&fields.output)?;

        Ok(Self {
            airfoil: fields.airfoil,
            reynolds: fields.reynolds as u64,
            mach: fields.mach,
            alpha: AlphaSweep {
                start: fields.alpha_start,
                end: fields.alpha_end,
                step: fields.alpha_step,
            },
            output: fields.output,
            debug: fields.debug,
        })
    }

    pub fn airfoil(&self) -> &str {
        &self.airfoil
    }

    pub fn reynolds(&self) -> u64 {
        self.reynolds
    }

    pub fn mach(&self) -> f64 {
        self.mach
    }

    pub fn alpha(&self) -> AlphaSweep {
        self.alpha
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Debug runs keep the tool's plotting layer and stdout, and echo commands.
    pub fn debug(&self) -> bool {
        self.debug
    }
}

/// Output paths need at least 4 characters and a file extension.
pub(crate) fn validate_output_path(path: &Path) -> Result<(), ParameterError> {
    let long_enough = path.as_os_str().len() >= 4;
    if !long_enough || path.extension().is_none() {
        return Err(ParameterError::MissingExtension(path.to_path_buf()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> RunRequestFields {
        RunRequestFields {
            airfoil: "0012".to_string(),
            reynolds: 500_000,
            mach: 0.1,
            alpha_start: -10.0,
            alpha_end: 10.0,
            alpha_step: 2.0,
            output: PathBuf::from("out.dat"),
            debug: false,
        }
    }

    #[test]
    fn test_valid_request() {
        let req = RunRequest::new(fields()).unwrap();
        assert_eq!(req.airfoil(), "0012");
        assert_eq!(req.reynolds(), 500_000);
        assert_eq!(req.alpha().center(), 0.0);
        assert_eq!(req.output(), Path::new("out.dat"));
    }

    #[test]
    fn test_rejects_empty_airfoil() {
        let mut f = fields();
        f.airfoil = "  ".to_string();
        assert_eq!(RunRequest::new(f), Err(ParameterError::EmptyAirfoil));
    }

    #[test]
    fn test_rejects_non_positive_reynolds() {
        let mut f = fields();
        f.reynolds = 0;
        assert_eq!(
            RunRequest::new(f),
            Err(ParameterError::NonPositiveReynolds(0))
        );
    }

    #[test]
    fn test_rejects_mach_bounds() {
        for mach in [0.0, 1.0, -0.2, 1.7] {
            let mut f = fields();
            f.mach = mach;
            assert_eq!(
                RunRequest::new(f),
                Err(ParameterError::MachOutOfRange(mach)),
                "mach {mach} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_nan_mach() {
        let mut f = fields();
        f.mach = f64::NAN;
        assert_eq!(
            RunRequest::new(f),
            Err(ParameterError::NonFinite { field: "mach" })
        );
    }

    #[test]
    fn test_rejects_zero_step() {
        let mut f = fields();
        f.alpha_step = 0.0;
        assert_eq!(RunRequest::new(f), Err(ParameterError::NonPositiveStep(0.0)));
    }

    #[test]
    fn test_rejects_step_larger_than_span() {
        let mut f = fields();
        f.alpha_start = 0.0;
        f.alpha_end = 1.0;
        f.alpha_step = 1.5;
        assert!(matches!(
            RunRequest::new(f),
            Err(ParameterError::SpanSmallerThanStep { .. })
        ));
    }

    #[test]
    fn test_accepts_descending_sweep() {
        let mut f = fields();
        f.alpha_start = 10.0;
        f.alpha_end = -10.0;
        assert!(RunRequest::new(f).is_ok());
    }

    #[test]
    fn test_rejects_output_without_extension() {
        for output in ["out", "polar_output", ".dat", ""] {
            let mut f = fields();
            f.output = PathBuf::from(output);
            assert!(
                matches!(RunRequest::new(f), Err(ParameterError::MissingExtension(_))),
                "{output:?} should be rejected"
            );
        }
    }
}
