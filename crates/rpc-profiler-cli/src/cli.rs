//! Command definitions for the `rpc-profiler` tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rpc_profiler_core::{ProfilerConfig, ProfilingId, WorkerId};
use serde::Serialize;
use std::path::PathBuf;

use crate::simulate::{self, SimulationOptions, SimulationReport};
use crate::ExitCode;

/// RPC profiler tools
///
/// Inspect globally-unique profiling ids and exercise caller/callee
/// correlation across simulated workers.
#[derive(Parser, Debug)]
#[command(name = "rpc-profiler")]
#[command(about = "Inspect RPC profiling ids and simulate cross-worker correlation", long_about = None)]
#[command(version)]
pub struct ProfilerCli {
    /// Output verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: ProfilerCommands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum ProfilerCommands {
    /// Split a profiling id into its worker and sequence
    Decode {
        /// Raw decimal id, or `<worker>:<sequence>`
        id: String,
    },

    /// Build a profiling id from a worker and sequence
    Encode {
        /// Worker id (0-65535)
        #[arg(short, long)]
        worker: u16,

        /// Position in the worker's allocation sequence
        #[arg(short, long)]
        sequence: u64,
    },

    /// Run an in-process caller/callee correlation simulation
    ///
    /// Workers form a ring; each one issues calls to its neighbour and
    /// checks that every response correlates to its request.
    Simulate {
        /// Number of simulated workers
        #[arg(short, long, default_value_t = 4)]
        workers: u16,

        /// Calls issued by each worker
        #[arg(short, long, default_value_t = 100)]
        calls: usize,

        /// TOML file with base registry settings
        #[arg(long)]
        config: Option<PathBuf>,

        /// First worker id, overriding the config file
        #[arg(long, env = "RPC_PROFILER_WORKER_ID")]
        worker_id: Option<u16>,
    },
}

/// Output format options
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON for machine processing
    Json,
}

/// Decoded view of one profiling id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdReport {
    pub id: String,
    pub raw: u64,
    pub worker_id: WorkerId,
    pub sequence: u64,
}

impl From<ProfilingId> for IdReport {
    fn from(id: ProfilingId) -> Self {
        Self {
            id: id.to_string(),
            raw: id.as_u64(),
            worker_id: id.created_on(),
            sequence: id.sequence(),
        }
    }
}

/// Decode a textual id
pub fn decode(id: &str) -> Result<IdReport> {
    let id: ProfilingId = id.parse()?;
    Ok(id.into())
}

/// Encode a worker and sequence into an id
pub fn encode(worker: u16, sequence: u64) -> Result<IdReport> {
    Ok(ProfilingId::from_parts(WorkerId::new(worker), sequence)?.into())
}

/// Render an id report
pub fn render_id(report: &IdReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Text => format!(
            "id:        {}\nraw:       {}\nworker:    {}\nsequence:  {}",
            report.id, report.raw, report.worker_id, report.sequence
        ),
    })
}

/// Render a simulation report
pub fn render_simulation(report: &SimulationReport, format: OutputFormat) -> Result<String> {
    if format == OutputFormat::Json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let status = if report.is_clean() { "CLEAN" } else { "MISMATCHED" };
    let mut out = format!(
        "Simulation: {status}\n  workers:     {}\n  calls:       {}\n  correlated:  {}\n  mismatched:  {}\n  unique ids:  {}\n",
        report.workers, report.total_calls, report.correlated, report.mismatched, report.unique_ids
    );
    for stats in &report.registries {
        out.push_str(&format!(
            "  worker {:>5}: allocated={} saved={} erased={} live={}\n",
            stats.worker_id.get(),
            stats.ids_allocated,
            stats.saved,
            stats.erased,
            stats.live_keys
        ));
    }
    Ok(out.trim_end().to_string())
}

fn simulation_options(
    workers: u16,
    calls: usize,
    config: Option<PathBuf>,
    worker_id: Option<u16>,
) -> Result<SimulationOptions> {
    let mut base = match config {
        Some(path) => ProfilerConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ProfilerConfig::new(0u16),
    };
    if let Some(worker_id) = worker_id {
        base.worker_id = WorkerId::new(worker_id);
    }
    Ok(SimulationOptions {
        workers,
        calls_per_worker: calls,
        base,
    })
}

/// Run the CLI with the given arguments and return the exit code
pub fn run(cli: ProfilerCli) -> Result<ExitCode> {
    match cli.command {
        ProfilerCommands::Decode { id } => {
            println!("{}", render_id(&decode(&id)?, cli.format)?);
            Ok(ExitCode::Success)
        }
        ProfilerCommands::Encode { worker, sequence } => {
            println!("{}", render_id(&encode(worker, sequence)?, cli.format)?);
            Ok(ExitCode::Success)
        }
        ProfilerCommands::Simulate {
            workers,
            calls,
            config,
            worker_id,
        } => {
            let options = simulation_options(workers, calls, config, worker_id)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?;
            let report = runtime.block_on(simulate::run(options))?;
            println!("{}", render_simulation(&report, cli.format)?);
            Ok(if report.is_clean() {
                ExitCode::Success
            } else {
                ExitCode::CorrelationFailure
            })
        }
    }
}
