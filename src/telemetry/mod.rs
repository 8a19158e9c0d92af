//! Prometheus metrics for the Policy Validation Agent
//!
//! Collects the operational signals of the pipeline:
//! - `facts_evaluated_total` (counter) - facts by evaluation result
//! - `violations_recorded_total` (counter) - violations by severity
//! - `evaluation_duration_seconds` (histogram) - evaluation latency
//! - `open_violations` (gauge) - violations currently in open status
//! - `stream_subscribers` (gauge) - attached SSE subscribers

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

use crate::error::{PolicyError, Result};
use crate::models::Severity;

/// Evaluation result label values for the facts counter
#[derive(Debug, Clone, Copy)]
pub enum FactOutcome {
    Compliant,
    Violation,
    Unmatched,
    Error,
}

impl FactOutcome {
    fn label(&self) -> &'static str {
        match self {
            FactOutcome::Compliant => "compliant",
            FactOutcome::Violation => "violation",
            FactOutcome::Unmatched => "unmatched",
            FactOutcome::Error => "error",
        }
    }
}

/// Metrics registry for the agent
pub struct AgentMetrics {
    registry: Registry,

    /// Facts evaluated, by fact type and outcome
    facts_evaluated: CounterVec,

    /// Violations recorded, by severity
    violations_recorded: CounterVec,

    /// Evaluation duration distribution
    evaluation_duration: Histogram,

    /// Violations currently open
    open_violations: Gauge,

    /// Attached live-stream subscribers
    stream_subscribers: Gauge,

    /// Status updates applied, by target status
    status_updates: CounterVec,
}

impl AgentMetrics {
    pub fn new() -> Result<Arc<Self>> {
        let registry = Registry::new();

        let facts_evaluated = CounterVec::new(
            Opts::new("facts_evaluated_total", "Facts evaluated by outcome")
                .namespace("policy_validation"),
            &["fact_type", "outcome"],
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        let violations_recorded = CounterVec::new(
            Opts::new(
                "violations_recorded_total",
                "Violations recorded by severity",
            )
            .namespace("policy_validation"),
            &["severity"],
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        let evaluation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "evaluation_duration_seconds",
                "Fact evaluation duration in seconds",
            )
            .namespace("policy_validation")
            .buckets(vec![
                0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1,
            ]),
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        let open_violations = Gauge::new(
            "policy_validation_open_violations",
            "Violations currently in open status",
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        let stream_subscribers = Gauge::new(
            "policy_validation_stream_subscribers",
            "Attached live-stream subscribers",
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        let status_updates = CounterVec::new(
            Opts::new("status_updates_total", "Status updates by target status")
                .namespace("policy_validation"),
            &["status"],
        )
        .map_err(|e| PolicyError::internal(e.to_string()))?;

        registry
            .register(Box::new(facts_evaluated.clone()))
            .and_then(|_| registry.register(Box::new(violations_recorded.clone())))
            .and_then(|_| registry.register(Box::new(evaluation_duration.clone())))
            .and_then(|_| registry.register(Box::new(open_violations.clone())))
            .and_then(|_| registry.register(Box::new(stream_subscribers.clone())))
            .and_then(|_| registry.register(Box::new(status_updates.clone())))
            .map_err(|e| PolicyError::internal(e.to_string()))?;

        Ok(Arc::new(Self {
            registry,
            facts_evaluated,
            violations_recorded,
            evaluation_duration,
            open_violations,
            stream_subscribers,
            status_updates,
        }))
    }

    pub fn record_fact(&self, fact_type: &str, outcome: FactOutcome) {
        self.facts_evaluated
            .with_label_values(&[fact_type, outcome.label()])
            .inc();
    }

    pub fn record_violation(&self, severity: Severity) {
        self.violations_recorded
            .with_label_values(&[&severity.to_string()])
            .inc();
    }

    pub fn record_status_update(&self, status: &str) {
        self.status_updates.with_label_values(&[status]).inc();
    }

    /// The gauge follows the ledger's open count rather than tracking
    /// increments, so it stays correct across any transition path.
    pub fn set_open_violations(&self, count: usize) {
        self.open_violations.set(count as f64);
    }

    pub fn observe_evaluation(&self, seconds: f64) {
        self.evaluation_duration.observe(seconds);
    }

    pub fn subscriber_attached(&self) {
        self.stream_subscribers.inc();
    }

    pub fn subscriber_detached(&self) {
        self.stream_subscribers.dec();
    }

    /// Text exposition for the /metrics endpoint.
    pub fn gather(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| PolicyError::internal(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| PolicyError::internal(e.to_string()))
    }
}

/// Gauge guard that marks a subscriber detached when the stream drops.
pub struct SubscriberGuard {
    metrics: Arc<AgentMetrics>,
}

impl SubscriberGuard {
    pub fn new(metrics: Arc<AgentMetrics>) -> Self {
        metrics.subscriber_attached();
        Self { metrics }
    }
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.metrics.subscriber_detached();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let metrics = AgentMetrics::new().unwrap();
        metrics.record_fact("fee_post", FactOutcome::Violation);
        metrics.record_violation(Severity::High);
        metrics.observe_evaluation(0.0002);

        let text = metrics.gather().unwrap();
        assert!(text.contains("policy_validation_facts_evaluated_total"));
        assert!(text.contains("policy_validation_violations_recorded_total"));
        assert!(text.contains("policy_validation_open_violations"));
    }

    #[test]
    fn test_open_gauge_tracks_ledger_count() {
        let metrics = AgentMetrics::new().unwrap();
        metrics.set_open_violations(2);
        metrics.record_status_update("resolved");
        metrics.set_open_violations(1);

        let text = metrics.gather().unwrap();
        assert!(text.contains("policy_validation_open_violations 1"));
    }

    #[test]
    fn test_subscriber_guard_balances_gauge() {
        let metrics = AgentMetrics::new().unwrap();
        {
            let _guard = SubscriberGuard::new(Arc::clone(&metrics));
            let text = metrics.gather().unwrap();
            assert!(text.contains("policy_validation_stream_subscribers 1"));
        }
        let text = metrics.gather().unwrap();
        assert!(text.contains("policy_validation_stream_subscribers 0"));
    }
}
