use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::{debug, error};

/// Failures while relaying a request to the backend.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("No upstream named '{0}' is configured")]
    UnknownUpstream(String),
    #[error("Invalid upstream URI: {0}")]
    InvalidUri(String),
    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Error forwarding request to upstream: {0}")]
    Upstream(Box<dyn std::error::Error + Send + Sync>),
    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),
}

impl ForwardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::UnknownUpstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::InvalidUri(_) | ForwardError::Serialize(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        error!("{}", self);
        self.status_code().into_response()
    }
}

/// Failures surfaced by the registration handlers.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(serde_json::Error),
    #[error(transparent)]
    Forward(#[from] ForwardError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::MalformedBody(e) => {
                debug!("Rejecting request with malformed body: {}", e);
                StatusCode::BAD_REQUEST.into_response()
            }
            RelayError::Forward(e) => e.into_response(),
        }
    }
}
