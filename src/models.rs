//! Core domain types for the Policy Validation Agent
//!
//! Defines the rule, fact, and violation models shared by the store,
//! the evaluation engine, and the ledger. Rules are immutable once stored;
//! edits create a new version. Facts are ephemeral inputs and are not
//! persisted beyond the violation records they produce.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{PolicyError, Result};

/// Severity assigned to rules and inherited by their violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

/// Attributes whose rules default to high severity when the author does not
/// set one explicitly.
const HIGH_SEVERITY_ATTRS: &[&str] = &[
    "fee", "rate", "report", "deadline", "sector", "prohibit", "ltv", "collateral", "notice",
];

impl Severity {
    /// Derive a default severity from the monitored field name.
    pub fn derive_from_field(field: &str) -> Self {
        let field = field.to_ascii_lowercase();
        if HIGH_SEVERITY_ATTRS.iter().any(|k| field.contains(k)) {
            Severity::High
        } else {
            Severity::Medium
        }
    }
}

/// Comparison operator applied by a rule against an observed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    /// Inclusive of both bounds
    Between,
}

impl Operator {
    /// Operators that require a numeric observed value and threshold
    pub fn is_ordered(&self) -> bool {
        matches!(
            self,
            Operator::LessThan
                | Operator::LessOrEqual
                | Operator::GreaterThan
                | Operator::GreaterOrEqual
                | Operator::Between
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::LessThan => "less_than",
            Operator::LessOrEqual => "less_or_equal",
            Operator::GreaterThan => "greater_than",
            Operator::GreaterOrEqual => "greater_or_equal",
            Operator::Between => "between",
        };
        write!(f, "{}", s)
    }
}

/// Rule threshold: a single number, a categorical value, or an inclusive
/// numeric range for `between`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Range([f64; 2]),
    Text(String),
}

impl Threshold {
    pub fn describe(&self) -> String {
        match self {
            Threshold::Number(n) => n.to_string(),
            Threshold::Range([lo, hi]) => format!("[{}, {}]", lo, hi),
            Threshold::Text(s) => s.clone(),
        }
    }
}

/// Observed value carried by a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObservedValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl ObservedValue {
    /// Numeric view of the value, normalizing numeric strings and trailing
    /// percent signs ("1.75%" reads as 0.0175).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ObservedValue::Number(n) => Some(*n),
            ObservedValue::Text(s) => {
                let s = s.trim();
                if let Some(stripped) = s.strip_suffix('%') {
                    stripped.trim().parse::<f64>().ok().map(|n| n / 100.0)
                } else {
                    s.parse::<f64>().ok()
                }
            }
            ObservedValue::Flag(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ObservedValue::Flag(b) => b.to_string(),
            ObservedValue::Number(n) => n.to_string(),
            ObservedValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ObservedValue {
    fn from(n: f64) -> Self {
        ObservedValue::Number(n)
    }
}

impl From<&str> for ObservedValue {
    fn from(s: &str) -> Self {
        ObservedValue::Text(s.to_string())
    }
}

/// Source evidence reference attached to a rule. Opaque to the evaluation
/// path; carried through into violations for audit display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Source document filename
    pub doc: String,
    /// 1-based page number, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Clause text the rule was derived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_snippet: Option<String>,
    /// Content hash of the source snippet for version pinning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl Evidence {
    pub fn new(doc: impl Into<String>) -> Self {
        Self {
            doc: doc.into(),
            ..Default::default()
        }
    }

    /// Attach a text snippet and pin its content hash.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        let snippet = snippet.into();
        let mut hasher = Sha256::new();
        hasher.update(snippet.as_bytes());
        self.hash = Some(hex::encode(hasher.finalize()));
        self.text_snippet = Some(snippet);
        self
    }
}

/// Rule content as submitted to the Policy Store. Versioning is assigned by
/// the store on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Stable rule identifier; re-submitting an id creates a new version
    pub id: String,
    /// Entity the rule applies to (matched case-insensitively)
    pub subject: String,
    /// Monitored attribute, e.g. "fee_rate"
    pub field: String,
    pub operator: Operator,
    pub threshold: Threshold,
    /// Absolute numeric tolerance; comparisons are exact when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    /// Defaults from the field name when not set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl RuleSpec {
    /// Check structural validity: required fields present, operator and
    /// threshold types compatible, range ordered, tolerance non-negative.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(PolicyError::validation("rule id must not be empty"));
        }
        if self.subject.trim().is_empty() {
            return Err(PolicyError::validation("rule subject must not be empty"));
        }
        if self.field.trim().is_empty() {
            return Err(PolicyError::validation("rule field must not be empty"));
        }
        if let Some(t) = self.tolerance {
            if !(t >= 0.0) {
                return Err(PolicyError::validation(format!(
                    "tolerance must be non-negative, got {}",
                    t
                )));
            }
        }
        match (self.operator, &self.threshold) {
            (Operator::Between, Threshold::Range([lo, hi])) => {
                if lo > hi {
                    return Err(PolicyError::validation(format!(
                        "between requires lower <= upper, got [{}, {}]",
                        lo, hi
                    )));
                }
                Ok(())
            }
            (Operator::Between, other) => Err(PolicyError::validation(format!(
                "between requires a two-value numeric range, got {}",
                other.describe()
            ))),
            (op, Threshold::Range(_)) => Err(PolicyError::validation(format!(
                "operator {} takes a single threshold, not a range",
                op
            ))),
            (op, Threshold::Text(_)) if op.is_ordered() => Err(PolicyError::validation(format!(
                "operator {} requires a numeric threshold",
                op
            ))),
            _ => Ok(()),
        }
    }

    /// Effective severity: explicit value or keyword-derived default.
    pub fn effective_severity(&self) -> Severity {
        self.severity
            .unwrap_or_else(|| Severity::derive_from_field(&self.field))
    }
}

/// A rule as held by the Policy Store: submitted content plus the
/// store-assigned version and insertion timestamp. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRule {
    #[serde(flatten)]
    pub spec: RuleSpec,
    /// Monotonically increasing per rule id, starting at 1
    pub version: u64,
    pub created_at: DateTime<Utc>,
}

impl StoredRule {
    pub fn id(&self) -> &str {
        &self.spec.id
    }

    pub fn severity(&self) -> Severity {
        self.spec.effective_severity()
    }
}

/// A single observed data point submitted for compliance checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Event category, e.g. "fee_post"
    #[serde(rename = "type")]
    pub fact_type: String,
    pub subject: String,
    pub field: String,
    pub value: ObservedValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Fact {
    pub fn new(
        fact_type: impl Into<String>,
        subject: impl Into<String>,
        field: impl Into<String>,
        value: impl Into<ObservedValue>,
    ) -> Self {
        Self {
            fact_type: fact_type.into(),
            subject: subject.into(),
            field: field.into(),
            value: value.into(),
            timestamp: None,
        }
    }
}

/// Lifecycle status of a violation. Progression is one-way:
/// open -> acknowledged -> resolved, with open -> resolved allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStatus {
    Open,
    Acknowledged,
    Resolved,
}

impl ViolationStatus {
    /// Whether the one-way progression permits moving to `next`.
    pub fn can_transition_to(&self, next: ViolationStatus) -> bool {
        matches!(
            (self, next),
            (ViolationStatus::Open, ViolationStatus::Acknowledged)
                | (ViolationStatus::Open, ViolationStatus::Resolved)
                | (ViolationStatus::Acknowledged, ViolationStatus::Resolved)
        )
    }
}

impl fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationStatus::Open => write!(f, "open"),
            ViolationStatus::Acknowledged => write!(f, "acknowledged"),
            ViolationStatus::Resolved => write!(f, "resolved"),
        }
    }
}

/// Violation produced by the evaluator, before the ledger assigns identity
/// and status. References the rule id + version and the triggering fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationDraft {
    pub rule_id: String,
    pub rule_version: u64,
    pub fact_type: String,
    pub subject: String,
    pub field: String,
    pub observed: ObservedValue,
    /// What the rule required, for display
    pub expected: String,
    pub severity: Severity,
    pub evidence: Evidence,
}

/// A recorded violation. Owned by the ledger; append-only with a mutable
/// status field, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub rule_id: String,
    pub rule_version: u64,
    pub fact_type: String,
    pub subject: String,
    pub field: String,
    pub observed: ObservedValue,
    pub expected: String,
    pub severity: Severity,
    pub status: ViolationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub evidence: Evidence,
}

impl Violation {
    /// Materialize a draft with ledger-assigned identity and timestamps.
    pub fn from_draft(draft: ViolationDraft, id: String, at: DateTime<Utc>) -> Self {
        Self {
            id,
            rule_id: draft.rule_id,
            rule_version: draft.rule_version,
            fact_type: draft.fact_type,
            subject: draft.subject,
            field: draft.field,
            observed: draft.observed,
            expected: draft.expected,
            severity: draft.severity,
            status: ViolationStatus::Open,
            created_at: at,
            updated_at: at,
        evidence: draft.evidence,
        }
    }
}
