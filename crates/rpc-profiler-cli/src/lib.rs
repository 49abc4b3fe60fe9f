//! Command-line tools for RPC profiling correlation
//!
//! ```bash
//! # Split a raw id into worker and sequence
//! rpc-profiler decode 844424930131969
//!
//! # Build an id from its parts
//! rpc-profiler encode --worker 3 --sequence 1
//!
//! # Run a four-worker correlation simulation
//! rpc-profiler simulate --workers 4 --calls 100 --format json
//! ```

pub mod cli;
pub mod simulate;

pub use cli::{OutputFormat, ProfilerCli, ProfilerCommands};

use rpc_profiler_core::ProfilerError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Simulation finished but some calls did not correlate
    CorrelationFailure = 1,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl ExitCode {
    /// Classify an error that aborted a command
    pub fn for_error(err: &anyhow::Error) -> Self {
        let user_error = err.chain().any(|cause| {
            cause
                .downcast_ref::<ProfilerError>()
                .is_some_and(|e| !e.is_contract_violation())
        });
        if user_error {
            ExitCode::InvalidInput
        } else {
            ExitCode::InternalError
        }
    }
}

/// Run the CLI application
pub fn run_cli(cli: ProfilerCli) -> ExitCode {
    match cli::run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::for_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::CorrelationFailure), 1);
        assert_eq!(i32::from(ExitCode::InvalidInput), 3);
    }

    #[test]
    fn test_exit_code_for_error() {
        let err = cli::decode("garbage").unwrap_err();
        assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidInput);

        let err = anyhow::anyhow!("runtime failed");
        assert_eq!(ExitCode::for_error(&err), ExitCode::InternalError);
    }
}
