mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use chrono::Utc;
use common::*;
use protein_scan_backend::create_app;
use protein_scan_backend::services::billing::BillingService;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_test";

async fn post_webhook(app: &Router, payload: &[u8], signature: Option<&str>) -> StatusCode {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("stripe-signature", signature);
    }

    app.clone()
        .oneshot(builder.body(Body::from(payload.to_vec())).unwrap())
        .await
        .unwrap()
        .status()
}

fn sign(payload: &[u8]) -> String {
    BillingService::sign_webhook_payload(WEBHOOK_SECRET, Utc::now().timestamp(), payload)
}

#[tokio::test]
async fn test_checkout_completed_upgrades_plan() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (access, _) = register_and_login(&app, "payer@example.com").await;
    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    let user_id = profile["id"].as_str().unwrap().to_string();
    assert_eq!(profile["plan"], "free");
    assert_eq!(profile["monthly_limit"], 5);

    let payload = json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "client_reference_id": user_id,
            "customer": "cus_abc123"
        }}
    })
    .to_string();

    let status = post_webhook(&app, payload.as_bytes(), Some(&sign(payload.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);

    // Pro plan: no monthly cap reported
    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(profile["plan"], "pro");
    assert!(profile["monthly_limit"].is_null());

    // And the analysis limit really is gone
    for i in 0..6 {
        let (status, _) = post_json(
            &app,
            "/analyses",
            Some(&access),
            json!({"blob_name": format!("meals/payer/meal-{}.jpg", i)}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_subscription_deleted_downgrades_plan() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (access, _) = register_and_login(&app, "churner@example.com").await;
    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    let user_id = profile["id"].as_str().unwrap().to_string();

    let upgrade = json!({
        "type": "checkout.session.completed",
        "data": {"object": {
            "client_reference_id": user_id,
            "customer": "cus_churn"
        }}
    })
    .to_string();
    let status = post_webhook(&app, upgrade.as_bytes(), Some(&sign(upgrade.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);

    let downgrade = json!({
        "type": "customer.subscription.deleted",
        "data": {"object": {"customer": "cus_churn"}}
    })
    .to_string();
    let status = post_webhook(&app, downgrade.as_bytes(), Some(&sign(downgrade.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(profile["plan"], "free");

    // Events for customers we have never seen are acknowledged, not errors
    let unknown = json!({
        "type": "customer.subscription.deleted",
        "data": {"object": {"customer": "cus_stranger"}}
    })
    .to_string();
    let status = post_webhook(&app, unknown.as_bytes(), Some(&sign(unknown.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_webhook_signature_enforced() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (access, _) = register_and_login(&app, "victim@example.com").await;
    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    let user_id = profile["id"].as_str().unwrap().to_string();

    let payload = json!({
        "type": "checkout.session.completed",
        "data": {"object": {"client_reference_id": user_id, "customer": "cus_evil"}}
    })
    .to_string();

    // Missing header
    let status = post_webhook(&app, payload.as_bytes(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Signed with the wrong secret
    let forged = BillingService::sign_webhook_payload(
        "whsec_wrong",
        Utc::now().timestamp(),
        payload.as_bytes(),
    );
    let status = post_webhook(&app, payload.as_bytes(), Some(&forged)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Valid signature over a different body
    let other = sign(b"{}");
    let status = post_webhook(&app, payload.as_bytes(), Some(&other)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // None of the forgeries changed the plan
    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(profile["plan"], "free");
}

#[tokio::test]
async fn test_unhandled_event_types_are_acknowledged() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let payload = json!({"type": "invoice.paid", "data": {"object": {}}}).to_string();
    let status = post_webhook(&app, payload.as_bytes(), Some(&sign(payload.as_bytes()))).await;
    assert_eq!(status, StatusCode::OK);
}
