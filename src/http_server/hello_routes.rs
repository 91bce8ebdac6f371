//! Hello HTTP Routes
//!
//! Long-poll endpoint for clients, publish endpoint for the replication side,
//! plus health and metrics.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::observability::{Event, MetricsSnapshot};
use crate::topology::{
    version_document, Document, DocumentError, Notifier, ReplicaSetDescription, RequestHandler,
    TopologyError,
};

/// Code reported when the request body is not a valid command document
const FAILED_TO_PARSE: i32 = 9;
/// Code reported when a published description is inconsistent
const BAD_VALUE: i32 = 2;

// ==================
// Shared State
// ==================

/// State shared across handlers
pub struct HelloState {
    handler: RequestHandler<ReplicaSetDescription>,
    started_at: DateTime<Utc>,
}

impl HelloState {
    /// Serve `notifier`, granting no wait longer than `max_await`
    pub fn new(notifier: Arc<Notifier<ReplicaSetDescription>>, max_await: Duration) -> Self {
        Self {
            handler: RequestHandler::with_max_await(notifier, max_await),
            started_at: Utc::now(),
        }
    }

    fn notifier(&self) -> &Arc<Notifier<ReplicaSetDescription>> {
        self.handler.notifier()
    }
}

// ==================
// Request/Response Types
// ==================

/// Failure body, in the same shape as a failed command reply
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: f64,
    pub errmsg: String,
    pub code: i32,
    #[serde(rename = "codeName")]
    pub code_name: String,
}

impl ErrorResponse {
    fn new(code: i32, code_name: &str, errmsg: impl Into<String>) -> Self {
        Self {
            ok: 0.0,
            errmsg: errmsg.into(),
            code,
            code_name: code_name.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub process_id: String,
    pub counter: u64,
    pub started_at: String,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    #[serde(flatten)]
    pub counters: MetricsSnapshot,
    pub pending_waiters: usize,
}

type RouteError = (StatusCode, Json<ErrorResponse>);

fn topology_error(err: &TopologyError) -> RouteError {
    let status = match err {
        TopologyError::Validation(_) => StatusCode::BAD_REQUEST,
        TopologyError::ShutdownInProgress => StatusCode::SERVICE_UNAVAILABLE,
        TopologyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse::new(err.code(), err.code_name(), err.to_string())),
    )
}

fn parse_error(err: &DocumentError) -> RouteError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(FAILED_TO_PARSE, "FailedToParse", err.to_string())),
    )
}

// ==================
// Hello Routes
// ==================

/// Create hello routes
pub fn hello_routes(state: Arc<HelloState>) -> Router {
    Router::new()
        .route("/hello", post(hello_handler))
        .route("/topology", post(publish_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// The body is parsed straight into a `Document` so that repeated keys survive
/// and reach validation as `DuplicateField`.
async fn hello_handler(
    State(state): State<Arc<HelloState>>,
    body: Bytes,
) -> Result<Json<JsonValue>, RouteError> {
    let request_id = Uuid::new_v4();
    let request = Document::from_extended_json_slice(&body).map_err(|e| {
        debug!(event = %Event::RequestRejected, %request_id, error = %e, "unparseable hello");
        parse_error(&e)
    })?;

    let response = state
        .handler
        .handle_async(&request)
        .await
        .map_err(|e| topology_error(&e))?;
    let document = response.to_document().map_err(|e| {
        state.notifier().report_internal(&e);
        topology_error(&e)
    })?;

    debug!(
        %request_id,
        kind = %response.kind,
        version = %response.snapshot.version(),
        waited_ms = response.waited.as_millis() as u64,
        "hello answered"
    );
    Ok(Json(document.to_extended_json()))
}

async fn publish_handler(
    State(state): State<Arc<HelloState>>,
    Json(description): Json<ReplicaSetDescription>,
) -> Result<Json<JsonValue>, RouteError> {
    if let Err(err) = description.validate() {
        warn!(error = %err, "rejected topology publish");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(BAD_VALUE, "BadValue", err.to_string())),
        ));
    }

    let version = state
        .notifier()
        .publish(description)
        .map_err(|e| topology_error(&e))?;
    let encoded = version_document(&version).map_err(|e| topology_error(&e))?;

    Ok(Json(json!({
        "ok": 1.0,
        "topologyVersion": encoded.to_extended_json(),
    })))
}

async fn health_handler(State(state): State<Arc<HelloState>>) -> Json<HealthResponse> {
    let notifier = state.notifier();
    let version = notifier.version();
    let status = if notifier.is_shutting_down() {
        "shutting_down"
    } else {
        "healthy"
    };

    Json(HealthResponse {
        status,
        process_id: version.process_id().to_hex(),
        counter: version.counter(),
        started_at: state.started_at.to_rfc3339(),
    })
}

async fn metrics_handler(State(state): State<Arc<HelloState>>) -> Json<MetricsResponse> {
    let notifier = state.notifier();
    Json(MetricsResponse {
        counters: notifier.metrics().snapshot(),
        pending_waiters: notifier.pending_waiters(),
    })
}
