//! HTTP API handlers.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::correlator::Correlator;
use crate::error::ApiError;
use crate::metrics;
use crate::traffic::EnrichedTrafficRecord;

/// Application state shared with handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Correlator over the shared store pool.
    pub correlator: Correlator,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(correlator: Correlator) -> Self {
        Self {
            correlator,
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the store answered a ping.
    pub ready: bool,
    /// Ping failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parameters of a `/TrafficService` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficRequest {
    /// Database holding both collections.
    pub database: String,
    /// Collection of traffic records.
    pub network_collection: String,
    /// Service to correlate.
    pub service_name: String,
}

impl TrafficRequest {
    /// Decode request parameters from a JSON object body.
    pub fn from_body(body: &[u8]) -> Result<Self, ApiError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| ApiError::InvalidBody(e.to_string()))?;

        let Value::Object(fields) = value else {
            return Err(ApiError::InvalidBody("expected a JSON object".to_string()));
        };

        Ok(Self {
            database: required(&fields, "database")?,
            network_collection: required(&fields, "networkCollection")?,
            service_name: required(&fields, "serviceName")?,
        })
    }
}

fn required(fields: &Map<String, Value>, key: &'static str) -> Result<String, ApiError> {
    match fields.get(key) {
        Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ApiError::MissingField(key)),
    }
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if the store answers, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.correlator.store().ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                error: None,
            }),
        ),
        Err(e) => {
            warn!("Store ping failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

/// Metrics handler - Prometheus exposition text, 404 without a recorder.
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Traffic correlation handler.
pub async fn traffic_service(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<EnrichedTrafficRecord>>, ApiError> {
    let _timer = metrics::timer_http("/TrafficService");
    let request = TrafficRequest::from_body(&body)?;

    let rows = state
        .correlator
        .traffic_for_service(
            &request.database,
            &request.network_collection,
            &request.service_name,
        )
        .await
        .map_err(|e| {
            error!(service = %request.service_name, "Correlation failed: {}", e);
            ApiError::from(e)
        })?;

    Ok(Json(rows))
}
