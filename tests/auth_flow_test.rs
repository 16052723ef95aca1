mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::*;
use jsonwebtoken::{EncodingKey, Header, encode};
use protein_scan_backend::create_app;
use protein_scan_backend::entities::one_time_tokens;
use protein_scan_backend::services::token::Claims;
use protein_scan_backend::utils::hash::calculate_hash;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_register_and_login() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (status, _) = post_json(
        &app,
        "/auth/register",
        None,
        json!({"email": "new@example.com", "password": "password123", "display_name": "New User"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // Duplicate registration is refused
    let (status, body) = post_json(
        &app,
        "/auth/register",
        None,
        json!({"email": "new@example.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email already in use");

    // Weak passwords are refused
    let (status, _) = post_json(
        &app,
        "/auth/register",
        None,
        json!({"email": "weak@example.com", "password": "short"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Email matching is case-insensitive
    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "NEW@example.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access_token"].as_str().is_some());
    assert_eq!(body["expires_in"], 900);

    // Wrong password gets the same message as an unknown account
    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "new@example.com", "password": "wrongpassword"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "nobody@example.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[tokio::test]
async fn test_refresh_rotation_revokes_old_token() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (_, old_refresh) = register_and_login(&app, "rotator@example.com").await;

    // One live session after login
    let (_, access) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "rotator@example.com", "password": "password123"}),
    )
    .await;
    let access_token = access["access_token"].as_str().unwrap();
    let (status, sessions) = get_json(&app, "/auth/sessions", Some(access_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sessions.as_array().unwrap().len(), 2); // login helper + this login

    let (status, rotated) = post_json(
        &app,
        "/auth/refresh",
        None,
        json!({"refresh_token": old_refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_refresh = rotated["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, old_refresh);

    // The replaced token is dead: reuse is rejected
    let (status, body) = post_json(
        &app,
        "/auth/refresh",
        None,
        json!({"refresh_token": old_refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid refresh token");

    // The successor still works
    let (status, _) = post_json(
        &app,
        "/auth/refresh",
        None,
        json!({"refresh_token": new_refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Rotation never grows the live-session count
    let (_, sessions) = get_json(&app, "/auth/sessions", Some(access_token)).await;
    assert_eq!(sessions.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (_, refresh) = register_and_login(&app, "leaver@example.com").await;

    let (status, _) = post_json(&app, "/auth/logout", None, json!({"refresh_token": refresh})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = post_json(
        &app,
        "/auth/refresh",
        None,
        json!({"refresh_token": refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Logout is idempotent, even for tokens it has never seen
    let (status, _) = post_json(&app, "/auth/logout", None, json!({"refresh_token": refresh})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = post_json(
        &app,
        "/auth/logout",
        None,
        json!({"refresh_token": "never-issued"}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_bearer_token_requirements() {
    let db = setup_test_db().await;
    let app = create_app(build_state(db, Arc::new(MockVisionAi::new()), test_config()));

    let (access, refresh) = register_and_login(&app, "bearer@example.com").await;

    // The real access token works
    let (status, _) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(status, StatusCode::OK);

    // No token, garbage, and a refresh token in the access slot all fail
    let (status, _) = get_json(&app, "/users/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(&app, "/users/me", Some("not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = get_json(&app, "/users/me", Some(&refresh)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // An expired access token is rejected even with a valid signature
    let claims = Claims {
        sub: "someone".to_string(),
        email: "bearer@example.com".to_string(),
        token_type: "access".to_string(),
        iss: "protein-scan-backend".to_string(),
        aud: "protein-scan-app".to_string(),
        iat: (Utc::now() - Duration::hours(2)).timestamp(),
        exp: (Utc::now() - Duration::hours(1)).timestamp(),
        jti: None,
    };
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap();
    let (status, _) = get_json(&app, "/users/me", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

async fn seed_one_time_token(
    db: &sea_orm::DatabaseConnection,
    user_id: &str,
    purpose: &str,
    ttl_hours: i64,
) -> String {
    let raw = format!("test-token-{}", Uuid::new_v4());
    one_time_tokens::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id.to_string()),
        token_hash: Set(calculate_hash(raw.as_bytes())),
        purpose: Set(purpose.to_string()),
        expires_at: Set(Utc::now() + Duration::hours(ttl_hours)),
        used_at: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .unwrap();
    raw
}

#[tokio::test]
async fn test_password_reset_revokes_all_sessions() {
    let db = setup_test_db().await;
    let app = create_app(build_state(
        db.clone(),
        Arc::new(MockVisionAi::new()),
        test_config(),
    ));

    let (access, refresh) = register_and_login(&app, "forgetful@example.com").await;

    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    let user_id = profile["id"].as_str().unwrap().to_string();

    // Requesting a reset always answers 202, account or not
    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        None,
        json!({"email": "forgetful@example.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = post_json(
        &app,
        "/auth/forgot-password",
        None,
        json!({"email": "nobody@example.com"}),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let raw = seed_one_time_token(&db, &user_id, "reset_password", 1).await;

    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        None,
        json!({"token": raw, "new_password": "brand-new-pass"}),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // A one-time token is spent after use
    let (status, _) = post_json(
        &app,
        "/auth/reset-password",
        None,
        json!({"token": raw, "new_password": "another-pass-123"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Every pre-reset session is gone
    let (status, _) = post_json(
        &app,
        "/auth/refresh",
        None,
        json!({"refresh_token": refresh}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Old password no longer works, the new one does
    let (status, _) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "forgetful@example.com", "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post_json(
        &app,
        "/auth/login",
        None,
        json!({"email": "forgetful@example.com", "password": "brand-new-pass"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_email_verification() {
    let db = setup_test_db().await;
    let app = create_app(build_state(
        db.clone(),
        Arc::new(MockVisionAi::new()),
        test_config(),
    ));

    let (access, _) = register_and_login(&app, "verifier@example.com").await;

    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(profile["email_verified"], false);
    let user_id = profile["id"].as_str().unwrap().to_string();

    // An expired verification token is useless
    let stale = seed_one_time_token(&db, &user_id, "verify_email", -1).await;
    let (status, _) = post_json(&app, "/auth/verify-email", None, json!({"token": stale})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A reset token cannot double as a verification token
    let wrong_purpose = seed_one_time_token(&db, &user_id, "reset_password", 1).await;
    let (status, _) = post_json(
        &app,
        "/auth/verify-email",
        None,
        json!({"token": wrong_purpose}),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let raw = seed_one_time_token(&db, &user_id, "verify_email", 24).await;
    let (status, _) = post_json(&app, "/auth/verify-email", None, json!({"token": raw})).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, profile) = get_json(&app, "/users/me", Some(&access)).await;
    assert_eq!(profile["email_verified"], true);
}
