#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use taski_api::auth::{AppState, AppStateInner};
use taski_db::Database;
use taski_gateway::{MutationBroadcaster, TopicRegistry};

pub const SECRET: &str = "test-secret";

/// App state over an in-memory database with a running dispatcher.
pub fn test_state() -> AppState {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let registry = TopicRegistry::new();
    let (broadcaster, _dispatcher) = MutationBroadcaster::spawn(registry.clone());
    Arc::new(AppStateInner {
        db,
        jwt_secret: SECRET.into(),
        token_ttl_days: 1,
        registry,
        broadcaster,
    })
}

pub async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Register a user through the API and return `(token, user_id)`.
pub async fn register(app: &Router, username: &str) -> (String, Uuid) {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/register",
        None,
        Some(json!({ "username": username, "password": "correct horse battery" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_str().unwrap().parse().unwrap(),
    )
}

/// Serve the router on an ephemeral port.
pub async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = taski_api::router(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
