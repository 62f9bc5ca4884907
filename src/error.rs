//! Unified error types for the traffic service.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Unified error type for the traffic service.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Document store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Traffic correlation error.
    #[error("correlation error: {0}")]
    Correlate(#[from] CorrelateError),

    /// Cluster orchestration error.
    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Document store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Client could not be built or the server never answered the ping.
    #[error("failed to connect to MongoDB: {0}")]
    Connect(#[source] mongodb::error::Error),

    /// Driver error while running an operation.
    #[error("failed to {operation}: {source}")]
    Query {
        /// Operation that failed (e.g. "query collection").
        operation: &'static str,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },

    /// Operation exceeded the configured bound.
    #[error("{operation} timed out after {after_secs}s")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Configured bound in seconds.
        after_secs: u64,
    },

    /// Backend refused the operation (used by non-Mongo stores).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Pipeline stage the store cannot evaluate.
    #[error("unsupported pipeline stage: {0}")]
    UnsupportedStage(String),

    /// Value could not be converted into a BSON document.
    #[error("failed to encode document: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),
}

/// Service IP resolution errors.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No service record has the requested name.
    #[error("service not found: {0}")]
    NotFound(String),

    /// The matched record has no string `ip_address`.
    #[error("invalid IP address format for service {0}")]
    MalformedRecord(String),

    /// The service collection could not be queried.
    #[error("failed to query service collection: {0}")]
    QueryFailed(#[source] StoreError),
}

/// Traffic correlation errors.
#[derive(Error, Debug)]
pub enum CorrelateError {
    /// Resolving the service name failed.
    #[error("failed to get service IP: {0}")]
    ServiceIp(#[from] ResolveError),

    /// The traffic or companion query could not execute.
    #[error("failed to aggregate data: {0}")]
    QueryFailed(#[source] StoreError),
}

impl CorrelateError {
    /// True when the requested service does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CorrelateError::ServiceIp(ResolveError::NotFound(_)))
    }
}

/// HTTP request errors, mapped onto status codes.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body was not a JSON object.
    #[error("Failed to read request body: {0}")]
    InvalidBody(String),

    /// A required parameter is absent, empty or not a string.
    #[error("Missing or invalid '{0}' parameter")]
    MissingField(&'static str),

    /// Correlator failed.
    #[error("Error running aggregation query: {0}")]
    Correlation(#[from] CorrelateError),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidBody(_) | ApiError::MissingField(_) => StatusCode::BAD_REQUEST,
            // NotFound stays a 500; clients match on the message text.
            ApiError::Correlation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Cluster orchestration errors.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Kubernetes API or client error.
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig could not be read or applied.
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Service does not exist in the namespace.
    #[error("failed to get service: {namespace}/{name} not found")]
    NotFound {
        /// Namespace searched.
        namespace: String,
        /// Service name.
        name: String,
    },

    /// Service with that name already exists.
    #[error("service {namespace}/{name} already exists")]
    AlreadyExists {
        /// Namespace.
        namespace: String,
        /// Service name.
        name: String,
    },

    /// Service object declares no ports.
    #[error("service {0} declares no ports")]
    MissingPort(String),

    /// Orchestrator temporarily unavailable.
    #[error("orchestrator unavailable: {0}")]
    Unavailable(String),

    /// Recording the service in the document store failed.
    #[error("failed to record service: {0}")]
    Record(#[from] StoreError),

    /// Every attempt failed with a transient error.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error seen.
        #[source]
        last: Box<OrchestratorError>,
    },
}

impl OrchestratorError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            OrchestratorError::Unavailable(_) => true,
            OrchestratorError::Kube(kube::Error::Api(resp)) => {
                resp.code == 429 || resp.code >= 500
            }
            OrchestratorError::Kube(kube::Error::HyperError(_))
            | OrchestratorError::Kube(kube::Error::Service(_)) => true,
            _ => false,
        }
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ServiceError>;
