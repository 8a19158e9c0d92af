//! CLI module for the Policy Validation Agent
//!
//! Provides commands for serving the HTTP API, validating a facts file
//! against a policy bundle offline, inspecting policy bundles, and
//! replaying a facts CSV into a running agent.

pub mod commands;
pub mod output;

pub use commands::{PolicyCli, PolicyCommands};
pub use output::OutputFormat;

use crate::error::PolicyError;

/// Exit codes for CLI operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Successful execution, no violations found
    Success = 0,
    /// Evaluation completed and found violations
    ViolationsFound = 1,
    /// Invalid input or arguments
    InvalidInput = 3,
    /// File not found or inaccessible
    FileError = 4,
    /// Internal error
    InternalError = 10,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Run the CLI with the given arguments and return the exit code
pub async fn run(cli: PolicyCli) -> Result<ExitCode, PolicyError> {
    match cli.command {
        PolicyCommands::Serve {
            bind,
            policy,
            queue_capacity,
            channel_capacity,
        } => commands::execute_serve(bind, policy, queue_capacity, channel_capacity).await,
        PolicyCommands::Validate {
            policy,
            facts,
            format,
        } => commands::execute_validate(policy, facts, format),
        PolicyCommands::Rules { policy, format } => commands::execute_rules(policy, format),
        PolicyCommands::Replay {
            csv,
            endpoint,
            delay_ms,
        } => commands::execute_replay(csv, endpoint, delay_ms).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_conversion() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::ViolationsFound), 1);
        assert_eq!(i32::from(ExitCode::InvalidInput), 3);
        assert_eq!(i32::from(ExitCode::InternalError), 10);
    }
}
