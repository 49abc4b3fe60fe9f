//! RPC profiler CLI
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Simulation finished with uncorrelated calls
//! - 3: Invalid input or arguments
//! - 10: Internal error

use clap::Parser;
use rpc_profiler_cli::{run_cli, ProfilerCli};
use tracing::Level;

fn main() {
    let cli = ProfilerCli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run_cli(cli);
    std::process::exit(exit_code.into());
}
