//! Registration relay - forwards organization registration requests to a backend
//!
//! This library exposes the license and payment registration endpoints. Each endpoint parses the
//! incoming JSON body and hands it, with a fixed backend path and method, to an injected
//! [`forward::Forwarder`] whose response is returned unchanged.

use axum::Router;
use axum::routing::post;
use axum_prometheus::{
    GenericMetricLayer, Handle, PrometheusMetricLayerBuilder,
    metrics_exporter_prometheus::PrometheusHandle,
};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, instrument};

pub mod client;
pub mod endpoint;
pub mod errors;
pub mod forward;
pub mod handlers;
pub mod upstream;

use client::{HttpClient, PoolConfig};
use endpoint::{Endpoint, LICENSE_PATH, PAYMENT_PATH};
use forward::{Forwarder, UpstreamProxy};
use handlers::{register_license, register_payment};
use upstream::Upstreams;

/// The main application state: one forwarder per registration endpoint.
#[derive(Clone, Debug)]
pub struct AppState {
    pub license_forwarder: Arc<dyn Forwarder>,
    pub payment_forwarder: Arc<dyn Forwarder>,
}

impl AppState {
    /// Create a new AppState forwarding through a pooled hyper client
    pub fn new(upstreams: Upstreams, pool: PoolConfig) -> Self {
        Self::with_client(upstreams, client::create_hyper_client(pool))
    }

    /// Create a new AppState with a custom HTTP client (useful for testing)
    pub fn with_client<T>(upstreams: Upstreams, http_client: T) -> Self
    where
        T: HttpClient + Clone + Send + Sync + 'static,
    {
        let proxy_for = |endpoint: Endpoint| -> Arc<dyn Forwarder> {
            Arc::new(UpstreamProxy::new(
                endpoint.upstream(),
                upstreams.clone(),
                http_client.clone(),
            ))
        };
        Self {
            license_forwarder: proxy_for(Endpoint::License),
            payment_forwarder: proxy_for(Endpoint::Payment),
        }
    }

    /// Create a new AppState from explicit forwarders
    pub fn with_forwarders(
        license_forwarder: Arc<dyn Forwarder>,
        payment_forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            license_forwarder,
            payment_forwarder,
        }
    }
}

/// Build the main router for the relay
/// This creates routes for:
/// - `POST /api/organization/register/license`
/// - `POST /api/organization/register/payment`
///
/// Any other method on those paths is answered with 405 by the method router.
#[instrument(skip(state))]
pub fn build_router(state: AppState) -> Router {
    info!("Building router");
    Router::new()
        .route(LICENSE_PATH, post(register_license))
        .route(PAYMENT_PATH, post(register_payment))
        .with_state(state)
}

/// Builds a router for the metrics endpoint.
#[instrument(skip(handle))]
pub fn build_metrics_router(handle: PrometheusHandle) -> Router {
    info!("Building metrics router");
    Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    )
}

type MetricsLayerAndHandle = (
    GenericMetricLayer<'static, PrometheusHandle, Handle>,
    PrometheusHandle,
);

/// Builds a layer and handle for prometheus metrics collection.
///
/// `prefix` accepts either a string literal or an owned string; the metrics layer requires it
/// to live for the whole program.
pub fn build_metrics_layer_and_handle(
    prefix: impl Into<Cow<'static, str>>,
) -> MetricsLayerAndHandle {
    info!("Building metrics layer");
    PrometheusMetricLayerBuilder::new()
        .with_prefix(prefix)
        .enable_response_body_size(true)
        .with_endpoint_label_type(axum_prometheus::EndpointLabel::Exact)
        .with_default_metrics()
        .build_pair()
}
