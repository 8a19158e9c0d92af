//! Command definitions and execution for the policy-validate CLI

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::output::{self, OutputFormat};
use super::ExitCode;
use crate::client::AgentClient;
use crate::error::{PolicyError, Result};
use crate::handler::{create_router, AppState, FactRequest};
use crate::intake::{self, FactIntake, DEFAULT_QUEUE_CAPACITY};
use crate::ledger::{ViolationLedger, DEFAULT_CHANNEL_CAPACITY};
use crate::store::{PolicyBundle, PolicyStore, RuleFilter};
use crate::telemetry::AgentMetrics;

/// Policy Validation Agent CLI
#[derive(Debug, Parser)]
#[command(name = "policy-validate", version, about)]
pub struct PolicyCli {
    #[command(subcommand)]
    pub command: PolicyCommands,
}

#[derive(Debug, Subcommand)]
pub enum PolicyCommands {
    /// Run the HTTP API server
    Serve {
        /// Address to bind, host:port
        #[arg(long, default_value = "0.0.0.0:7000", env = "POLICY_BIND")]
        bind: String,
        /// Policy bundle (YAML/JSON) to preload into the store
        #[arg(long, env = "POLICY_BUNDLE")]
        policy: Option<PathBuf>,
        /// Fact intake queue depth
        #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
        queue_capacity: usize,
        /// Per-subscriber event buffer for the live stream
        #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY)]
        channel_capacity: usize,
    },
    /// Validate a facts file against a policy bundle offline
    Validate {
        /// Policy bundle (YAML/JSON)
        #[arg(long)]
        policy: PathBuf,
        /// Facts file, one JSON fact submission per line
        #[arg(long)]
        facts: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Parse and summarize a policy bundle
    Rules {
        /// Policy bundle (YAML/JSON)
        #[arg(long)]
        policy: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Replay a facts CSV into a running agent
    Replay {
        /// CSV with columns: type,subject,fee_rate,report_delay_days,sector,notice_sent
        #[arg(long)]
        csv: PathBuf,
        /// Base URL of the running agent
        #[arg(long, default_value = "http://localhost:7000", env = "POLICY_ENDPOINT")]
        endpoint: String,
        /// Delay between submissions in milliseconds
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },
}

/// Run the HTTP server until interrupted.
pub async fn execute_serve(
    bind: String,
    policy: Option<PathBuf>,
    queue_capacity: usize,
    channel_capacity: usize,
) -> Result<ExitCode> {
    let store = Arc::new(PolicyStore::new());
    if let Some(path) = &policy {
        let bundle = PolicyBundle::from_path(path)?;
        let loaded = store.load_bundle(&bundle)?;
        tracing::info!(path = %path.display(), rules = loaded, "Policy bundle loaded");
    }

    let ledger = Arc::new(ViolationLedger::with_capacity(channel_capacity));
    let metrics = AgentMetrics::new()?;
    let evaluator = crate::engine::Evaluator::new(Arc::clone(&store));
    let (intake, _worker) = FactIntake::spawn(
        evaluator,
        Arc::clone(&ledger),
        Arc::clone(&metrics),
        queue_capacity,
    );

    let state = AppState::new(store, ledger, metrics, intake);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|e| PolicyError::internal(format!("failed to bind {}: {}", bind, e)))?;
    tracing::info!(bind = %bind, "Policy validation agent listening");

    axum::serve(listener, router)
        .await
        .map_err(|e| PolicyError::internal(e.to_string()))?;
    Ok(ExitCode::Success)
}

/// Offline validation: load a bundle, evaluate every fact in the file,
/// print recorded violations.
pub fn execute_validate(
    policy: PathBuf,
    facts: PathBuf,
    format: OutputFormat,
) -> Result<ExitCode> {
    let store = Arc::new(PolicyStore::new());
    let bundle = PolicyBundle::from_path(&policy)?;
    store.load_bundle(&bundle)?;

    let ledger = ViolationLedger::new();
    let metrics = AgentMetrics::new()?;
    let evaluator = crate::engine::Evaluator::new(Arc::clone(&store));

    let content = std::fs::read_to_string(&facts)
        .map_err(|e| PolicyError::file_error(format!("{}: {}", facts.display(), e)))?;

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let request: FactRequest = serde_json::from_str(line).map_err(|e| {
            PolicyError::parse_error(format!("{} line {}: {}", facts.display(), line_no + 1, e))
        })?;
        for fact in request.to_facts()? {
            intake::process_fact(&evaluator, &ledger, &metrics, &fact)?;
        }
    }

    let violations = ledger.snapshot(usize::MAX, &Default::default())?;
    println!("{}", output::render_violations(&violations, format));

    if violations.is_empty() {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::ViolationsFound)
    }
}

/// Parse a bundle, insert it into a scratch store to validate every rule,
/// and print the summary.
pub fn execute_rules(policy: PathBuf, format: OutputFormat) -> Result<ExitCode> {
    let bundle = PolicyBundle::from_path(&policy)?;
    let store = PolicyStore::new();
    store.load_bundle(&bundle)?;

    let rules = store.list(&RuleFilter::default())?;
    println!("{}", output::render_rules(&rules, format));
    Ok(ExitCode::Success)
}

/// Replay a facts CSV into a running agent, one POST per row.
pub async fn execute_replay(csv: PathBuf, endpoint: String, delay_ms: u64) -> Result<ExitCode> {
    let requests = parse_facts_csv(&csv)?;
    let client = AgentClient::new(endpoint)?;

    let mut total_violations = 0usize;
    for request in &requests {
        let response = client.post_fact(request).await?;
        if !response.violations.is_empty() {
            tracing::info!(
                fact_type = %request.fact_type,
                violations = response.violations.len(),
                "Replay produced violations"
            );
            total_violations += response.violations.len();
        }
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    println!(
        "replayed {} fact(s), {} violation(s)",
        requests.len(),
        total_violations
    );
    if total_violations == 0 {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::ViolationsFound)
    }
}

/// Parse the streaming-adapter CSV layout: a header row followed by simple
/// comma-separated values (fields never contain commas). Empty, "null",
/// and "none" cells are skipped.
pub fn parse_facts_csv(path: &Path) -> Result<Vec<FactRequest>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| PolicyError::file_error(format!("{}: {}", path.display(), e)))?;
    let mut lines = content.lines();

    let header: Vec<String> = lines
        .next()
        .ok_or_else(|| PolicyError::parse_error("facts CSV is empty"))?
        .split(',')
        .map(|h| h.trim().to_string())
        .collect();
    let type_idx = header
        .iter()
        .position(|h| h == "type")
        .ok_or_else(|| PolicyError::parse_error("facts CSV must have a 'type' column"))?;

    let mut requests = Vec::new();
    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').map(|c| c.trim()).collect();
        let fact_type = cells.get(type_idx).copied().unwrap_or_default();
        if fact_type.is_empty() {
            return Err(PolicyError::parse_error(format!(
                "facts CSV line {}: missing type",
                line_no + 2
            )));
        }

        let mut payload = serde_json::Map::new();
        for (idx, name) in header.iter().enumerate() {
            if idx == type_idx {
                continue;
            }
            let cell = cells.get(idx).copied().unwrap_or_default();
            if cell.is_empty() || cell.eq_ignore_ascii_case("null") || cell.eq_ignore_ascii_case("none")
            {
                continue;
            }
            payload.insert(name.clone(), csv_cell_value(cell));
        }

        requests.push(FactRequest {
            fact_type: fact_type.to_string(),
            payload,
        });
    }
    Ok(requests)
}

/// Type a CSV cell: number, boolean, or string.
fn csv_cell_value(cell: &str) -> serde_json::Value {
    if let Ok(n) = cell.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(n) {
            return serde_json::Value::Number(number);
        }
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => return serde_json::Value::Bool(true),
        "false" | "no" | "n" | "0" => return serde_json::Value::Bool(false),
        _ => {}
    }
    serde_json::Value::String(cell.to_string())
}
