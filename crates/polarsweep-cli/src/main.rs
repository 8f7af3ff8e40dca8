//! polarsweep - scripted XFOIL polar sweeps
//!
//! ## Commands
//!
//! - `sweep`: run an angle-of-attack sweep and accumulate the polar file
//! - `naca`: generate a NACA 4-digit section file

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use polarsweep_core::{
    init_tracing, NacaRequest, PolarsweepConfig, RunPlan, RunReport, RunRequest, RunRequestFields,
    SweepRunner, ToolLauncher,
};

/// Exit status for invalid parameters, reported before anything is spawned.
const PARAMETER_ERROR: u8 = 2;

#[derive(Parser)]
#[command(name = "polarsweep")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive XFOIL through scripted polar sweeps", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Log file (appended to)
    #[arg(long, global = true, default_value = "polarsweep.log")]
    log_file: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// XFOIL executable (overrides the configuration file)
    #[arg(long, global = true, env = "POLARSWEEP_TOOL")]
    tool: Option<String>,

    /// Write the run report as JSON to this path
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an angle-of-attack sweep for one airfoil
    #[command(allow_negative_numbers = true)]
    Sweep {
        /// Airfoil coordinate file to load
        airfoil: String,

        /// Reynolds number (positive integer)
        reynolds: i64,

        /// Mach number, strictly between 0 and 1
        mach: f64,

        /// First angle of attack (degrees)
        alpha_start: f64,

        /// Last angle of attack (degrees)
        alpha_end: f64,

        /// Angle increment (degrees)
        alpha_step: f64,

        /// Polar output file (must have an extension)
        output: PathBuf,

        /// 1 keeps XFOIL's plots and output visible, 0 runs quietly
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        debug: u8,
    },

    /// Generate a NACA 4-digit section file
    Naca {
        /// Four-digit designation, e.g. 12 or 2412
        designation: u32,

        /// Directory the section file is saved in
        #[arg(long, default_value = "airfoils")]
        dir: PathBuf,

        /// Keep XFOIL's plots and output visible
        #[arg(long)]
        debug: bool,
    },
}

impl Commands {
    fn debug(&self) -> bool {
        match self {
            Commands::Sweep { debug, .. } => *debug == 1,
            Commands::Naca { debug, .. } => *debug,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose || cli.command.debug() {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level, Some(&cli.log_file));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "polarsweep failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(cli.config.as_deref(), cli.tool)?;

    let plan = match cli.command {
        Commands::Sweep {
            airfoil,
            reynolds,
            mach,
            alpha_start,
            alpha_end,
            alpha_step,
            output,
            debug,
        } => {
            let fields = RunRequestFields {
                airfoil,
                reynolds,
                mach,
                alpha_start,
                alpha_end,
                alpha_step,
                output,
                debug: debug == 1,
            };
            match RunRequest::new(fields) {
                Ok(request) => RunPlan::sweep(&request, &config.sequence),
                Err(e) => return Ok(parameter_error(&e)),
            }
        }
        Commands::Naca {
            designation,
            dir,
            debug,
        } => {
            let request = match NacaRequest::new(designation, &dir, debug) {
                Ok(r) => r,
                Err(e) => return Ok(parameter_error(&e)),
            };
            if request.already_generated() {
                info!(path = %request.output().display(), "section already generated, skipping");
                return finish(&RunReport::skipped(&request.plan()), cli.report.as_deref());
            }
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create directory {}", dir.display()))?;
            request.plan()
        }
    };

    info!("basic setup complete, opening {}", config.tool.program);
    let runner = SweepRunner::new(ToolLauncher::new(config.tool.clone()), config);
    let report = runner.execute(&plan).await;
    finish(&report, cli.report.as_deref())
}

fn load_config(path: Option<&Path>, tool: Option<String>) -> Result<PolarsweepConfig> {
    let mut config = match path {
        Some(p) => PolarsweepConfig::load(p)
            .with_context(|| format!("load configuration {}", p.display()))?,
        None => PolarsweepConfig::default(),
    };
    if let Some(program) = tool {
        config.tool.program = program;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn parameter_error(e: &dyn std::fmt::Display) -> ExitCode {
    error!(error = %e, "parameter error");
    eprintln!("parameter error: {e}");
    ExitCode::from(PARAMETER_ERROR)
}

fn finish(report: &RunReport, report_path: Option<&Path>) -> Result<ExitCode> {
    if let Some(path) = report_path {
        report
            .write_json(path)
            .with_context(|| format!("write report {}", path.display()))?;
    }

    let status = if report.skipped {
        "skipped"
    } else if report.success {
        "ok"
    } else {
        "failed"
    };
    println!(
        "{} {}: {} of {} commands sent -> {}",
        report.label,
        status,
        report.commands_sent,
        report.commands_planned,
        report.artifact.display()
    );
    if let Some(e) = &report.error {
        println!("  error: {e}");
    }
    info!("polarsweep exiting");

    Ok(if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
