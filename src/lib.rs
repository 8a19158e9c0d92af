//! Policy Validation Agent
//!
//! An agent that validates streamed compliance facts against versioned
//! policy rules and maintains an append-only ledger of violations, served
//! over an HTTP API with a live SSE feed.
//!
//! ## Features
//!
//! - **Policy Store**: Versioned, append-only rule storage keyed by rule id
//! - **Rule Engine**: Threshold comparison with numeric, range, and text
//!   operators, optional absolute tolerance, and percent normalization
//! - **Violation Ledger**: Append-only violation log with a one-way status
//!   lifecycle and broadcast fan-out to stream subscribers
//! - **Fact Intake**: Bounded queue with a background evaluation worker
//! - **HTTP API**: REST endpoints plus an SSE stream with optional replay
//! - **CLI Support**: Serve, offline validation, bundle inspection, and
//!   CSV replay commands
//! - **Telemetry**: Prometheus metrics and structured tracing
//!
//! ## Architecture
//!
//! 1. **Models** (`models`): Rules, facts, violations, severities, and the
//!    threshold/operator vocabulary shared across the agent.
//!
//! 2. **Store** (`store`): In-memory versioned rule store and on-disk
//!    policy bundle loading.
//!
//! 3. **Engine** (`engine`): Matches facts to rules and decides compliance.
//!
//! 4. **Ledger** (`ledger`): Records violations, enforces status
//!    transitions, and broadcasts events.
//!
//! 5. **Intake** (`intake`): The shared evaluation pipeline and the bounded
//!    submission queue.
//!
//! 6. **Handler** (`handler/`): Axum routes, middleware, and wire types.
//!
//! 7. **Telemetry** (`telemetry/`): Prometheus metric registration and
//!    recording helpers.
//!
//! 8. **Client** (`client/`): HTTP client with retry for driving a running
//!    agent, used by the replay command.
//!
//! 9. **CLI** (`cli/`): Command-line interface over all of the above.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Serve the HTTP API with a preloaded policy bundle
//! policy-validate serve --bind 0.0.0.0:7000 --policy policy.yaml
//!
//! # Validate a facts file offline
//! policy-validate validate --policy policy.yaml --facts facts.jsonl
//!
//! # Inspect a policy bundle
//! policy-validate rules --policy policy.yaml --format json
//!
//! # Replay a facts CSV into a running agent
//! policy-validate replay --csv facts.csv --endpoint http://localhost:7000
//! ```

// Core modules
pub mod cli;
pub mod client;
pub mod engine;
pub mod error;
pub mod handler;
pub mod intake;
pub mod ledger;
pub mod models;
pub mod store;
pub mod telemetry;

// Re-export the types most callers need
pub use cli::{ExitCode, PolicyCli};
pub use client::AgentClient;
pub use engine::Evaluator;
pub use error::{PolicyError, Result};
pub use handler::{create_router, AppState};
pub use intake::FactIntake;
pub use ledger::{LedgerEvent, ViolationLedger};
pub use models::{Fact, RuleSpec, Severity, StoredRule, Violation, ViolationStatus};
pub use store::{PolicyBundle, PolicyStore};
pub use telemetry::AgentMetrics;

/// Agent version (from Cargo.toml)
pub const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Agent identifier
pub const AGENT_ID: &str = "policy-validation-agent";

/// Run the CLI application
///
/// This is the main entry point for the CLI binary.
///
/// # Example
///
/// ```rust,no_run
/// use clap::Parser;
/// use policy_validation::{run_cli, PolicyCli};
///
/// #[tokio::main]
/// async fn main() {
///     let cli = PolicyCli::parse();
///     let exit_code = run_cli(cli).await;
///     std::process::exit(exit_code.into());
/// }
/// ```
pub async fn run_cli(cli: PolicyCli) -> ExitCode {
    match cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e {
                PolicyError::FileError(_) => ExitCode::FileError,
                _ if e.is_user_error() => ExitCode::InvalidInput,
                _ => ExitCode::InternalError,
            }
        }
    }
}
