//! Forwarding of registration payloads to the backend
//!
//! Handlers never talk to the network directly: they hand `(path, method, body)` to a
//! [`Forwarder`] and return whatever it produces. [`UpstreamProxy`] is the production
//! implementation, relaying through an [`HttpClient`] to a named upstream.
use crate::client::HttpClient;
use crate::errors::ForwardError;
use crate::upstream::Upstreams;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, Uri, header},
    response::Response,
};
use serde_json::Value;
use tracing::{debug, instrument};

#[async_trait]
pub trait Forwarder: std::fmt::Debug + Send + Sync {
    /// Relays `body` to `path` on the backend with `method`, returning the backend's response.
    async fn forward(
        &self,
        path: &str,
        method: Method,
        body: Value,
    ) -> Result<Response, ForwardError>;
}

/// Forwards to the upstream registered under `upstream` in the live [`Upstreams`].
#[derive(Debug, Clone)]
pub struct UpstreamProxy<T: HttpClient> {
    upstream: String,
    upstreams: Upstreams,
    http_client: T,
}

impl<T: HttpClient> UpstreamProxy<T> {
    pub fn new(upstream: impl Into<String>, upstreams: Upstreams, http_client: T) -> Self {
        Self {
            upstream: upstream.into(),
            upstreams,
            http_client,
        }
    }
}

#[async_trait]
impl<T: HttpClient + Send + Sync> Forwarder for UpstreamProxy<T> {
    #[instrument(skip(self, body))]
    async fn forward(
        &self,
        path: &str,
        method: Method,
        body: Value,
    ) -> Result<Response, ForwardError> {
        debug!("Resolving upstream {}", self.upstream);
        let upstream = self
            .upstreams
            .get(&self.upstream)
            .ok_or_else(|| ForwardError::UnknownUpstream(self.upstream.clone()))?;

        let upstream_uri = upstream
            .join_path(path)
            .map_err(|e| ForwardError::InvalidUri(format!("{}{}: {}", upstream.url, path, e)))?
            .to_string();
        let upstream_uri_parsed = Uri::try_from(&upstream_uri)
            .map_err(|e| ForwardError::InvalidUri(format!("{upstream_uri}: {e}")))?;

        let body_bytes = serde_json::to_vec(&body)?;
        debug!("Forwarding {} bytes to {}", body_bytes.len(), upstream_uri);

        let mut builder = Request::builder()
            .method(method)
            .uri(upstream_uri_parsed.clone())
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body_bytes.len().to_string());

        if let Some(host) = upstream_uri_parsed.host() {
            let host_value = match upstream_uri_parsed.port_u16() {
                Some(port) => format!("{host}:{port}"),
                None => host.to_string(),
            };
            builder = builder.header(header::HOST, host_value);
        }

        if let Some(key) = &upstream.backend_key {
            let value = HeaderValue::try_from(format!("Bearer {key}"))
                .map_err(|e| ForwardError::InvalidUri(format!("backend key header: {e}")))?;
            builder = builder.header(header::AUTHORIZATION, value);
        } else {
            debug!("No backend key configured for {}", upstream.url);
        }

        let req = builder
            .body(Body::from(body_bytes))
            .map_err(|e| ForwardError::InvalidUri(e.to_string()))?;

        let response = match upstream.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.http_client.request(req))
                .await
                .map_err(|_| ForwardError::Timeout(limit))?,
            None => self.http_client.request(req).await,
        };

        response.map_err(ForwardError::Upstream)
    }
}
