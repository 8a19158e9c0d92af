//! Route definitions for the Policy Validation Agent
//!
//! - `POST /rules` - insert a rule (or a new version of an existing id)
//! - `GET  /rules` - list latest rule versions, with subject/field filters
//! - `GET  /rules/:id` - latest version of one rule
//! - `POST /facts` - evaluate a fact submission, record violations
//! - `GET  /violations` - ledger snapshot, newest first
//! - `POST /violations/:id/status` - advance a violation's status
//! - `GET  /violations/stream` - live SSE feed of ledger events
//! - `GET  /health`, `GET /metrics`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use super::{
    ApiResponse, ComponentHealth, ErrorInfo, FactRequest, FactResponse, HealthResponse,
    HealthStatus, StatusUpdateRequest, ViolationSummary,
};
use crate::engine::Evaluator;
use crate::error::PolicyError;
use crate::intake::{self, FactIntake};
use crate::ledger::{LedgerEvent, SnapshotFilter, ViolationLedger};
use crate::models::{RuleSpec, StoredRule, Violation};
use crate::store::{PolicyStore, RuleFilter};
use crate::telemetry::{AgentMetrics, SubscriberGuard};

/// Shared state behind all routes
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PolicyStore>,
    pub evaluator: Evaluator,
    pub ledger: Arc<ViolationLedger>,
    pub metrics: Arc<AgentMetrics>,
    pub intake: FactIntake,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        store: Arc<PolicyStore>,
        ledger: Arc<ViolationLedger>,
        metrics: Arc<AgentMetrics>,
        intake: FactIntake,
    ) -> Self {
        Self {
            evaluator: Evaluator::new(Arc::clone(&store)),
            store,
            ledger,
            metrics,
            intake,
            start_time: Instant::now(),
        }
    }
}

/// API error carrying a policy error plus the HTTP mapping
pub struct ApiError(PolicyError);

impl From<PolicyError> for ApiError {
    fn from(err: PolicyError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            PolicyError::Validation(_) => StatusCode::BAD_REQUEST,
            PolicyError::NotFound(_) => StatusCode::NOT_FOUND,
            PolicyError::InvalidTransition { .. } => StatusCode::CONFLICT,
            PolicyError::FileError(_) | PolicyError::ParseError(_) => StatusCode::BAD_REQUEST,
            PolicyError::HttpError(_) | PolicyError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_info = ErrorInfo::new(self.0.code(), self.0.to_string());
        let response = ApiResponse::<()>::error(error_info, uuid::Uuid::new_v4().to_string());
        (status, Json(response)).into_response()
    }
}

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_export))
        .route("/rules", post(put_rule).get(list_rules))
        .route("/rules/:rule_id", get(get_rule))
        .route("/facts", post(submit_fact))
        .route("/violations", get(snapshot_violations))
        .route("/violations/:violation_id/status", post(update_status))
        .route("/violations/stream", get(stream_violations))
        .layer(axum::middleware::from_fn(
            super::middleware::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /rules - Policy Store put
///
/// Inserts a new rule, or a new version when the id already exists.
pub async fn put_rule(
    State(state): State<AppState>,
    Json(spec): Json<RuleSpec>,
) -> Result<(StatusCode, Json<ApiResponse<StoredRule>>), ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let stored = state.store.put(spec)?;

    tracing::info!(
        rule_id = %stored.id(),
        version = stored.version,
        subject = %stored.spec.subject,
        "Rule stored"
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(stored, request_id)),
    ))
}

/// GET /rules - list latest versions, insertion order
pub async fn list_rules(
    State(state): State<AppState>,
    Query(filter): Query<RuleFilter>,
) -> Result<Json<ApiResponse<Vec<StoredRule>>>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let rules = state.store.list(&filter)?;
    Ok(Json(ApiResponse::success(rules, request_id)))
}

/// GET /rules/:id - latest version of one rule
pub async fn get_rule(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<ApiResponse<StoredRule>>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let rule = state.store.get(&rule_id)?;
    Ok(Json(ApiResponse::success(rule, request_id)))
}

/// POST /facts - synchronous fact evaluation
///
/// Evaluates every observed field in the payload and records resulting
/// violations. An unmatched fact returns an empty violation list.
pub async fn submit_fact(
    State(state): State<AppState>,
    Json(request): Json<FactRequest>,
) -> Result<Json<ApiResponse<FactResponse>>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let facts = request.to_facts()?;

    let mut violations: Vec<ViolationSummary> = Vec::new();
    for fact in &facts {
        let recorded = intake::process_fact(&state.evaluator, &state.ledger, &state.metrics, fact)?;
        violations.extend(recorded.iter().map(ViolationSummary::from));
    }

    Ok(Json(ApiResponse::success(
        FactResponse {
            facts_evaluated: facts.len(),
            violations,
        },
        request_id,
    )))
}

/// Query parameters for the snapshot endpoint
#[derive(Debug, serde::Deserialize)]
pub struct SnapshotQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub status: Option<crate::models::ViolationStatus>,
    pub subject: Option<String>,
}

fn default_limit() -> usize {
    200
}

/// GET /violations - point-in-time snapshot, newest first
pub async fn snapshot_violations(
    State(state): State<AppState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<ApiResponse<Vec<Violation>>>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let filter = SnapshotFilter {
        status: query.status,
        subject: query.subject,
    };
    let violations = state.ledger.snapshot(query.limit, &filter)?;
    Ok(Json(ApiResponse::success(violations, request_id)))
}

/// POST /violations/:id/status - advance the one-way status progression
pub async fn update_status(
    State(state): State<AppState>,
    Path(violation_id): Path<String>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<Violation>>, ApiError> {
    let request_id = uuid::Uuid::new_v4().to_string();
    let updated = state.ledger.update_status(&violation_id, request.status)?;
    state.metrics.record_status_update(&request.status.to_string());
    state.metrics.set_open_violations(state.ledger.open_count());

    tracing::info!(
        violation_id = %updated.id,
        status = %updated.status,
        "Violation status updated"
    );
    Ok(Json(ApiResponse::success(updated, request_id)))
}

/// Query parameters for the SSE stream
#[derive(Debug, serde::Deserialize)]
pub struct StreamQuery {
    /// Replay the current snapshot before live events
    #[serde(default)]
    pub replay: bool,
}

/// GET /violations/stream - live SSE feed
///
/// Emits `violation` events for new records and `violation_update` events
/// for status changes. A subscriber that falls behind the bounded buffer
/// receives a final `lagged` event and is disconnected; the ledger and
/// other subscribers are unaffected.
pub async fn stream_violations(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Subscribe before snapshotting so no event between the two is lost.
    let rx = state.ledger.subscribe();
    let guard = SubscriberGuard::new(Arc::clone(&state.metrics));

    let history: Vec<Violation> = if query.replay {
        // Fail the request here rather than serving an empty backlog.
        let mut snapshot = state
            .ledger
            .snapshot(default_limit(), &SnapshotFilter::default())?;
        snapshot.reverse(); // deliver replay in creation order
        snapshot
    } else {
        Vec::new()
    };

    let replayed = stream::iter(
        history
            .into_iter()
            .filter_map(|v| sse_event("violation", &v))
            .map(Ok),
    );

    let live = stream::unfold((rx, guard, false), |(mut rx, guard, done)| async move {
        if done {
            return None;
        }
        loop {
            match rx.recv().await {
                Ok(LedgerEvent::Created { violation }) => {
                    if let Some(event) = sse_event("violation", &violation) {
                        return Some((Ok(event), (rx, guard, false)));
                    }
                }
                Ok(LedgerEvent::Updated { violation }) => {
                    if let Some(event) = sse_event("violation_update", &violation) {
                        return Some((Ok(event), (rx, guard, false)));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "SSE subscriber lagged, disconnecting");
                    let event = Event::default()
                        .event("lagged")
                        .data(format!("{{\"missed\":{}}}", missed));
                    // Final event; the stream ends on the next poll.
                    return Some((Ok(event), (rx, guard, true)));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Ok(Sse::new(replayed.chain(live)).keep_alive(KeepAlive::default()))
}

fn sse_event(name: &str, violation: &Violation) -> Option<Event> {
    match serde_json::to_string(violation) {
        Ok(data) => Some(Event::default().event(name.to_string()).data(data)),
        Err(err) => {
            tracing::error!(error = %err, "Failed to serialize ledger event");
            None
        }
    }
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rules_loaded = state.store.len();
    let open_violations = state.ledger.open_count();

    let status = if rules_loaded > 0 {
        HealthStatus::Healthy
    } else {
        // Serving with an empty store is allowed but worth surfacing
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        components: ComponentHealth {
            policy_store: true,
            rules_loaded,
            ledger: true,
            open_violations,
        },
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /metrics - Prometheus text exposition
pub async fn metrics_export(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.gather()?;
    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
