mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use common::*;
use protein_scan_backend::create_app;
use std::sync::Arc;
use tower::ServiceExt;

async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

#[tokio::test]
async fn test_every_response_carries_request_id() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    // Not just /health: business routes get the header too
    for (method, uri, body) in [
        ("GET", "/health", Body::empty()),
        (
            "POST",
            "/auth/login",
            Body::from(r#"{"email":"nobody@example.com","password":"password123"}"#),
        ),
        ("GET", "/analyses", Body::empty()),
        ("GET", "/shared/unknown", Body::empty()),
    ] {
        let response = send(
            &app,
            Request::builder()
                .method(method)
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await;

        let request_id = response.headers().get("x-request-id");
        assert!(
            request_id.is_some_and(|v| !v.is_empty()),
            "{} {} response missing x-request-id",
            method,
            uri
        );
    }
}

#[tokio::test]
async fn test_client_supplied_request_id_is_echoed() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("x-request-id", "trace-me-123")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "trace-me-123"
    );
}

#[tokio::test]
async fn test_cors_respects_allowed_origins() {
    let db = setup_test_db().await;
    let mut config = test_config();
    config.allowed_origins = vec!["http://app.example.com".to_string()];
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), config));

    // Configured origin is allowed
    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("Origin", "http://app.example.com")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "http://app.example.com"
    );

    // Unlisted origins get no CORS grant
    let response = send(
        &app,
        Request::builder()
            .method("GET")
            .uri("/health")
            .header("Origin", "http://evil.example.com")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert!(
        response
            .headers()
            .get("access-control-allow-origin")
            .is_none()
    );

    // Preflight succeeds for the allowed origin and still carries the
    // correlation id
    let response = send(
        &app,
        Request::builder()
            .method("OPTIONS")
            .uri("/auth/login")
            .header("Origin", "http://app.example.com")
            .header("Access-Control-Request-Method", "POST")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());
}
