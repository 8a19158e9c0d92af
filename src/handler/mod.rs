//! Handler module for the Policy Validation Agent
//!
//! HTTP surface of the agent:
//! - rule ingestion and listing (Policy Store)
//! - fact submission (Rule Evaluator + Violation Ledger)
//! - violation snapshots, status updates, and the live SSE stream
//! - health and Prometheus metrics
//!
//! All JSON responses are wrapped in `ApiResponse` with request metadata
//! for tracing. Collaborators upstream of this surface (document
//! extraction, policy compilation, dashboards) are out of scope; they only
//! ever see these endpoints.

pub mod middleware;
pub mod routes;

pub use middleware::request_logging_middleware;
pub use routes::{create_router, AppState};

use serde::{Deserialize, Serialize};

use crate::models::{ObservedValue, Severity, Violation, ViolationStatus};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the operation was successful
    pub success: bool,
    /// Response data (present on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error information (present on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Request metadata for tracing
    pub metadata: ResponseMetadata,
}

impl<T> ApiResponse<T> {
    /// Create a successful response
    pub fn success(data: T, request_id: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: ResponseMetadata::new(request_id),
        }
    }

    /// Create an error response
    pub fn error(error: ErrorInfo, request_id: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error),
            metadata: ResponseMetadata::new(request_id),
        }
    }
}

/// Error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Response metadata for tracing and debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Unique request identifier
    pub request_id: String,
    /// Timestamp of response generation (ISO 8601)
    pub timestamp: String,
    /// Agent version
    pub version: String,
}

impl ResponseMetadata {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Fact submission body: `{"type": "...", "payload": {...}}`.
///
/// The payload carries the subject plus either an explicit `field`/`value`
/// pair or field-specific keys (`{"subject": "Institution A",
/// "fee_rate": 0.02}`), matching what streaming adapters emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactRequest {
    #[serde(rename = "type")]
    pub fact_type: String,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl FactRequest {
    /// Normalize the wire payload into one fact per observed field.
    pub fn to_facts(&self) -> crate::error::Result<Vec<crate::models::Fact>> {
        use crate::error::PolicyError;
        use crate::models::Fact;

        if self.fact_type.trim().is_empty() {
            return Err(PolicyError::validation("fact type must not be empty"));
        }

        let subject = self
            .payload
            .get("subject")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PolicyError::validation("fact payload must include 'subject'"))?
            .to_string();

        let timestamp = match self.payload.get("timestamp") {
            Some(v) => Some(
                serde_json::from_value(v.clone())
                    .map_err(|_| PolicyError::validation("fact timestamp must be RFC 3339"))?,
            ),
            None => None,
        };

        // Explicit {field, value} form takes precedence
        if let (Some(field), Some(value)) = (
            self.payload.get("field").and_then(|v| v.as_str()),
            self.payload.get("value"),
        ) {
            let value: ObservedValue = serde_json::from_value(value.clone())
                .map_err(|_| PolicyError::validation("fact value must be a number, string, or boolean"))?;
            return Ok(vec![Fact {
                fact_type: self.fact_type.clone(),
                subject,
                field: field.to_string(),
                value,
                timestamp,
            }]);
        }

        // Otherwise every remaining key is an observation
        let mut facts = Vec::new();
        for (key, value) in &self.payload {
            if key == "subject" || key == "timestamp" {
                continue;
            }
            let value: ObservedValue = serde_json::from_value(value.clone()).map_err(|_| {
                PolicyError::validation(format!(
                    "fact payload key '{}' must be a number, string, or boolean",
                    key
                ))
            })?;
            facts.push(Fact {
                fact_type: self.fact_type.clone(),
                subject: subject.clone(),
                field: key.clone(),
                value,
                timestamp,
            });
        }

        if facts.is_empty() {
            return Err(PolicyError::validation(
                "fact payload must carry at least one observed field",
            ));
        }
        Ok(facts)
    }
}

/// Fact submission result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactResponse {
    /// Summaries of violations recorded for this submission, empty when
    /// compliant or unmatched
    pub violations: Vec<ViolationSummary>,
    /// Observed fields evaluated from the payload
    pub facts_evaluated: usize,
}

/// Condensed violation view returned by fact submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub id: String,
    pub rule_id: String,
    pub rule_version: u64,
    pub subject: String,
    pub field: String,
    pub observed: ObservedValue,
    pub expected: String,
    pub severity: Severity,
    pub status: ViolationStatus,
}

impl From<&Violation> for ViolationSummary {
    fn from(v: &Violation) -> Self {
        Self {
            id: v.id.clone(),
            rule_id: v.rule_id.clone(),
            rule_version: v.rule_version,
            subject: v.subject.clone(),
            field: v.field.clone(),
            observed: v.observed.clone(),
            expected: v.expected.clone(),
            severity: v.severity,
            status: v.status,
        }
    }
}

/// Status update body for POST /violations/:id/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: ViolationStatus,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub components: ComponentHealth,
    pub uptime_seconds: u64,
    pub timestamp: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Per-component health breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Policy store reachable and populated
    pub policy_store: bool,
    /// Rules currently loaded
    pub rules_loaded: usize,
    /// Ledger reachable
    pub ledger: bool,
    /// Violations currently open
    pub open_violations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(payload: serde_json::Value) -> FactRequest {
        FactRequest {
            fact_type: "fee_post".to_string(),
            payload: payload.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_explicit_field_value_form() {
        let req = request(json!({
            "subject": "Institution A",
            "field": "fee_rate",
            "value": 0.02
        }));
        let facts = req.to_facts().unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].field, "fee_rate");
        assert_eq!(facts[0].value, ObservedValue::Number(0.02));
    }

    #[test]
    fn test_field_specific_keys_form() {
        let req = request(json!({
            "subject": "Institution A",
            "fee_rate": 0.02,
            "sector": "SIC:7372"
        }));
        let mut facts = req.to_facts().unwrap();
        facts.sort_by(|a, b| a.field.cmp(&b.field));
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].field, "fee_rate");
        assert_eq!(facts[1].field, "sector");
        assert_eq!(facts[1].subject, "Institution A");
    }

    #[test]
    fn test_missing_subject_rejected() {
        let req = request(json!({"fee_rate": 0.02}));
        assert!(req.to_facts().is_err());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let req = request(json!({"subject": "Institution A"}));
        assert!(req.to_facts().is_err());
    }

    #[test]
    fn test_nested_payload_value_rejected() {
        let req = request(json!({
            "subject": "Institution A",
            "fee_rate": {"nested": true}
        }));
        assert!(req.to_facts().is_err());
    }

    #[test]
    fn test_api_response_envelope_shape() {
        let resp = ApiResponse::success(42u32, "req-1".to_string());
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
        assert_eq!(json["metadata"]["request_id"], "req-1");
    }
}
