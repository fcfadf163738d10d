/// Axum handlers for the registration endpoints
use crate::AppState;
use crate::endpoint::Endpoint;
use crate::errors::RelayError;
use crate::forward::Forwarder;
use axum::{
    body::Bytes,
    extract::State,
    http::Method,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, info, instrument};

/// Parses `body` as JSON and hands it to `forwarder` for `endpoint`'s backend path.
///
/// The forwarder is only reached with a well-formed body, and its response is returned as-is.
pub async fn relay(
    forwarder: &dyn Forwarder,
    endpoint: Endpoint,
    body: &[u8],
) -> Result<Response, RelayError> {
    debug!("Received request body of size: {}", body.len());
    let payload: Value = serde_json::from_slice(body).map_err(RelayError::MalformedBody)?;

    info!("Forwarding {} registration to {}", endpoint, endpoint.path());
    Ok(forwarder
        .forward(endpoint.path(), Method::POST, payload)
        .await?)
}

#[instrument(skip(state, body))]
pub async fn register_license(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, RelayError> {
    relay(state.license_forwarder.as_ref(), Endpoint::License, &body).await
}

#[instrument(skip(state, body))]
pub async fn register_payment(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, RelayError> {
    relay(state.payment_forwarder.as_ref(), Endpoint::Payment, &body).await
}
