//! polarsweep core library
//!
//! Drives XFOIL through its command pipe: builds the command sequence for a
//! polar sweep, feeds it with mandatory pacing, watches the output file for
//! completion and shuts the tool down with bounded escalation.

pub mod config;
pub mod detector;
pub mod driver;
pub mod error;
pub mod fakes;
pub mod naca;
pub mod obs;
pub mod process;
pub mod request;
pub mod run;
pub mod sequence;
pub mod supervisor;
pub mod telemetry;

pub use config::{DriverConfig, PolarsweepConfig, SequenceConfig, ToolConfig};
pub use detector::{ArtifactProbe, Completion, CompletionDetector, DetectorConfig, FsProbe};
pub use driver::PipeDriver;
pub use error::{ParameterError, Result, SweepError};
pub use naca::NacaRequest;
pub use obs::RunSpan;
pub use process::{
    ChildProcess, ExitInfo, Launcher, ProcessHandle, ProcessState, ToolLauncher, ToolProcess,
};
pub use request::{AlphaSweep, RunRequest, RunRequestFields};
pub use run::{RunPlan, RunReport, SweepRunner};
pub use sequence::{build_sequence, format_angle, CommandSequence, PauseKind, Step};
pub use supervisor::{
    ShutdownConfig, ShutdownEntry, ShutdownReport, ShutdownState, ShutdownSupervisor, SignalSent,
};
pub use telemetry::{init_tracing, LogTarget};

/// polarsweep version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
