//! Run configuration: tool location and every timing constant.
//!
//! All sections default to the values the sweep has always used, so an empty
//! (or partial) TOML file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detector::DetectorConfig;
use crate::error::{Result, SweepError};
use crate::supervisor::ShutdownConfig;

/// Top-level configuration, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolarsweepConfig {
    pub tool: ToolConfig,
    pub driver: DriverConfig,
    pub sequence: SequenceConfig,
    pub detector: DetectorConfig,
    pub shutdown: ShutdownConfig,
}

/// Where the external tool lives and how it is invoked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable name or path.
    pub program: String,
    /// Extra arguments passed on spawn.
    pub args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "xfoil".to_string(),
            args: Vec::new(),
        }
    }
}

/// Pipe driver pacing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Minimum interval after each command (milliseconds).
    pub pacing_ms: u64,
    /// Grace period between spawn and the first command (milliseconds).
    pub startup_delay_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 200,
            startup_delay_ms: 1_000,
        }
    }
}

impl DriverConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }
}

/// Options that shape the generated command sequence and its pauses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SequenceConfig {
    /// Viscous solver iteration limit (`iter N`).
    pub iterations: u32,
    /// Emit `init` after every N-th `alfa` command (0 disables).
    pub reinit_every: usize,
    /// Pause after each sweep quarter-segment (milliseconds).
    pub segment_settle_ms: u64,
    /// Pause before closing accumulation (milliseconds).
    pub drain_settle_ms: u64,
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            iterations: 500,
            reinit_every: 5,
            segment_settle_ms: 10_000,
            drain_settle_ms: 5_000,
        }
    }
}

impl SequenceConfig {
    pub fn segment_settle(&self) -> Duration {
        Duration::from_millis(self.segment_settle_ms)
    }

    pub fn drain_settle(&self) -> Duration {
        Duration::from_millis(self.drain_settle_ms)
    }
}

impl PolarsweepConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SweepError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SweepError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would disable pacing or make a poll loop spin.
    pub fn validate(&self) -> Result<()> {
        if self.tool.program.trim().is_empty() {
            return Err(SweepError::Config("tool.program must not be empty".into()));
        }
        if self.driver.pacing_ms == 0 {
            return Err(SweepError::Config(
                "driver.pacing_ms must be at least 1".into(),
            ));
        }
        let intervals = [
            ("detector.appear_interval_ms", self.detector.appear_interval_ms),
            ("detector.activity_interval_ms", self.detector.activity_interval_ms),
            ("shutdown.poll_interval_ms", self.shutdown.poll_interval_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(SweepError::Config(format!("{name} must be at least 1")));
            }
        }
        if self.detector.appear_attempts == 0 {
            return Err(SweepError::Config(
                "detector.appear_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
