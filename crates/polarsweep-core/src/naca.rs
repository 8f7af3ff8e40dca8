//! NACA 4-digit section generation through the same command pipe.

use std::path::PathBuf;

use crate::error::ParameterError;
use crate::run::RunPlan;
use crate::sequence::{plotting_off, CommandSequence};

/// Request to have the tool generate and save a NACA 4-digit section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NacaRequest {
    designation: u32,
    directory: PathBuf,
    debug: bool,
}

impl NacaRequest {
    pub fn new(
        designation: u32,
        directory: impl Into<PathBuf>,
        debug: bool,
    ) -> Result<Self, ParameterError> {
        if designation > 9999 {
            return Err(ParameterError::InvalidDesignation(designation));
        }
        Ok(Self {
            designation,
            directory: directory.into(),
            debug,
        })
    }

    /// Zero-padded designation, e.g. `0012`.
    pub fn digits(&self) -> String {
        format!("{:04}", self.designation)
    }

    /// Where the tool saves the coordinates.
    pub fn output(&self) -> PathBuf {
        self.directory.join(format!("NACA{}-xf.dat", self.digits()))
    }

    /// The section file is already on disk.
    pub fn already_generated(&self) -> bool {
        self.output().is_file()
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn sequence(&self) -> CommandSequence {
        plotting_off(CommandSequence::builder(), self.debug)
            .send("naca")
            .send(self.digits())
            .send(format!("save {}", self.output().display()))
            .quit()
            .build()
    }

    pub fn plan(&self) -> RunPlan {
        RunPlan {
            label: format!("NACA{}", self.digits()),
            sequence: self.sequence(),
            artifact: self.output(),
            debug: self.debug,
        }
    }
}
