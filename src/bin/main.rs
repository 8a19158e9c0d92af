//! Policy Validation Agent CLI
//!
//! Command-line interface for the Policy Validation Agent.
//!
//! # Usage
//!
//! ```bash
//! # Serve the HTTP API with a preloaded policy bundle
//! policy-validate serve --bind 0.0.0.0:7000 --policy policy.yaml
//!
//! # Validate a facts file offline against a policy bundle
//! policy-validate validate --policy policy.yaml --facts facts.jsonl
//!
//! # Inspect a policy bundle
//! policy-validate rules --policy policy.yaml --format json
//!
//! # Replay a facts CSV into a running agent
//! policy-validate replay --csv facts.csv --endpoint http://localhost:7000
//! ```
//!
//! # Exit Codes
//!
//! - 0: Success, no violations found
//! - 1: Evaluation completed and found violations
//! - 3: Invalid input or arguments
//! - 4: File not found or inaccessible
//! - 10: Internal error

use clap::Parser;
use policy_validation::{run_cli, PolicyCli};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments
    let cli = PolicyCli::parse();

    // Run the CLI and exit with appropriate code
    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
