//! Integration tests for the registration relay
//!
//! These tests drive the full router, either against an in-process forwarder or against a real
//! backend bound to a local port.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use registration_relay::client::PoolConfig;
use registration_relay::errors::ForwardError;
use registration_relay::forward::Forwarder;
use registration_relay::upstream::{ConfigFile, Upstream, Upstreams};
use registration_relay::{AppState, build_router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tower::util::ServiceExt; // for oneshot()

#[derive(Debug, Default, Clone)]
struct RecordingForwarder {
    calls: Arc<Mutex<Vec<(String, Method, Value)>>>,
}

#[async_trait]
impl Forwarder for RecordingForwarder {
    async fn forward(
        &self,
        path: &str,
        method: Method,
        body: Value,
    ) -> Result<Response, ForwardError> {
        self.calls
            .lock()
            .unwrap()
            .push((path.to_string(), method, body.clone()));
        Ok((StatusCode::OK, Json(json!({ "echo": body }))).into_response())
    }
}

fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_license_registration_reaches_forwarder_once() {
    let license = RecordingForwarder::default();
    let payment = RecordingForwarder::default();
    let app = build_router(AppState::with_forwarders(
        Arc::new(license.clone()),
        Arc::new(payment.clone()),
    ));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/organization/register/license",
            r#"{"foo": "bar"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"echo": {"foo": "bar"}}));

    let calls = license.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![(
            "/api/organization/register/license".to_string(),
            Method::POST,
            json!({"foo": "bar"})
        )]
    );
    assert!(payment.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_payment_registration_reaches_forwarder_once() {
    let license = RecordingForwarder::default();
    let payment = RecordingForwarder::default();
    let app = build_router(AppState::with_forwarders(
        Arc::new(license.clone()),
        Arc::new(payment.clone()),
    ));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/organization/register/payment",
            r#"{"amount": 100}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let calls = payment.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![(
            "/api/organization/register/payment".to_string(),
            Method::POST,
            json!({"amount": 100})
        )]
    );
    assert!(license.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_method_not_allowed_for_non_post() {
    let forwarder = RecordingForwarder::default();
    let app = build_router(AppState::with_forwarders(
        Arc::new(forwarder.clone()),
        Arc::new(forwarder.clone()),
    ));

    for method in ["GET", "PUT", "DELETE", "PATCH"] {
        for path in [
            "/api/organization/register/license",
            "/api/organization/register/payment",
        ] {
            let response = app
                .clone()
                .oneshot(json_request(method, path, "{}"))
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{method} {path}"
            );
        }
    }

    assert!(forwarder.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_json_never_reaches_forwarder() {
    let forwarder = RecordingForwarder::default();
    let app = build_router(AppState::with_forwarders(
        Arc::new(forwarder.clone()),
        Arc::new(forwarder.clone()),
    ));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/organization/register/license",
            r#"{"foo": "#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(forwarder.calls.lock().unwrap().is_empty());
}

/// Starts a backend on a random local port that records what it receives and answers with a
/// recognisable status and header.
async fn spawn_backend() -> (String, Arc<Mutex<Vec<(String, HeaderMap, Value)>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));

    let record = |path: &'static str, status: StatusCode| {
        let received = Arc::clone(&received);
        move |headers: HeaderMap, Json(body): Json<Value>| {
            let received = Arc::clone(&received);
            async move {
                received
                    .lock()
                    .unwrap()
                    .push((path.to_string(), headers, body.clone()));
                (
                    status,
                    [("x-backend", "registration")],
                    Json(json!({ "received": body })),
                )
            }
        }
    };

    let backend = Router::new()
        .route(
            "/api/organization/register/license",
            post(record(
                "/api/organization/register/license",
                StatusCode::CREATED,
            )),
        )
        .route(
            "/api/organization/register/payment",
            post(record(
                "/api/organization/register/payment",
                StatusCode::PAYMENT_REQUIRED,
            )),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, backend).await.unwrap();
    });

    (format!("http://{addr}"), received)
}

#[tokio::test]
async fn test_end_to_end_relay_to_local_backend() {
    let (backend_url, received) = spawn_backend().await;

    let mut upstreams = HashMap::new();
    upstreams.insert(
        "api".to_string(),
        Upstream::builder()
            .url(backend_url.parse().unwrap())
            .backend_key("relay-secret".to_string())
            .timeout_ms(5_000)
            .build(),
    );
    upstreams.insert(
        "api-proxy".to_string(),
        Upstream::builder().url(backend_url.parse().unwrap()).build(),
    );
    let upstreams = Upstreams::from_config(ConfigFile { upstreams }).unwrap();

    let app = build_router(AppState::new(upstreams, PoolConfig::default()));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/organization/register/license",
            r#"{"foo": "bar"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-backend"], "registration");
    assert_eq!(body_json(response).await, json!({"received": {"foo": "bar"}}));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/organization/register/payment",
            r#"{"amount": 100}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    assert_eq!(
        body_json(response).await,
        json!({"received": {"amount": 100}})
    );

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);

    let (path, headers, body) = &received[0];
    assert_eq!(path, "/api/organization/register/license");
    assert_eq!(headers["authorization"], "Bearer relay-secret");
    assert_eq!(body, &json!({"foo": "bar"}));

    let (path, headers, body) = &received[1];
    assert_eq!(path, "/api/organization/register/payment");
    assert!(headers.get("authorization").is_none());
    assert_eq!(body, &json!({"amount": 100}));
}

#[tokio::test]
async fn test_unreachable_backend_is_bad_gateway() {
    // Bind then drop so nothing is listening on the port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let upstreams = Upstreams::default();
    for name in ["api", "api-proxy"] {
        upstreams.upstreams.insert(
            name.to_string(),
            Upstream::builder()
                .url(format!("http://{addr}").parse().unwrap())
                .build(),
        );
    }

    let app = build_router(AppState::new(upstreams, PoolConfig::default()));
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/organization/register/payment",
            r#"{"amount": 100}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
