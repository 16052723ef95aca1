#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use protein_scan_backend::AppState;
use protein_scan_backend::config::AppConfig;
use protein_scan_backend::infrastructure::database;
use protein_scan_backend::services::analysis_cache::AnalysisCache;
use protein_scan_backend::services::billing::BillingService;
use protein_scan_backend::services::mailer::Mailer;
use protein_scan_backend::services::session::SessionService;
use protein_scan_backend::services::storage::BlobStorage;
use protein_scan_backend::services::token::TokenService;
use protein_scan_backend::services::usage::UsageService;
use protein_scan_backend::services::vision::{FoodEstimate, MealAnalysis, VisionAi};
use sea_orm::{Database, DatabaseConnection};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// Vision mock that counts invocations and serves a canned result.
pub struct MockVisionAi {
    pub calls: AtomicUsize,
    response: MealAnalysis,
}

impl MockVisionAi {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response: MealAnalysis {
                foods: vec![
                    FoodEstimate {
                        name: "Grilled chicken breast".to_string(),
                        portion: "150g".to_string(),
                        protein_grams: 46.5,
                        carbs_grams: Some(0.0),
                        fat_grams: Some(5.4),
                    },
                    FoodEstimate {
                        name: "Brown rice".to_string(),
                        portion: "1 cup".to_string(),
                        protein_grams: 5.0,
                        carbs_grams: Some(45.0),
                        fat_grams: None,
                    },
                ],
                total_protein: 51.5,
                confidence: "high".to_string(),
                notes: Some("Plate partially occluded".to_string()),
            },
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAi for MockVisionAi {
    async fn analyze(&self, _image_url: &str) -> anyhow::Result<MealAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    async fn health(&self) -> bool {
        true
    }
}

pub struct MockBlobStorage;

#[async_trait]
impl BlobStorage for MockBlobStorage {
    async fn presigned_upload_url(
        &self,
        key: &str,
        _content_type: &str,
        _expires_in_secs: u64,
    ) -> anyhow::Result<String> {
        Ok(format!("http://blob.test/{}?X-Mock-Sig=put", key))
    }

    async fn presigned_read_url(&self, key: &str, _expires_in_secs: u64) -> anyhow::Result<String> {
        Ok(format!("http://blob.test/{}?X-Mock-Sig=get", key))
    }

    async fn delete_object(&self, _key: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn object_exists(&self, _key: &str) -> anyhow::Result<bool> {
        Ok(true)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: Some(TEST_JWT_SECRET.to_string()),
        free_monthly_limit: 5,
        ..AppConfig::default()
    }
}

pub fn build_state(
    db: DatabaseConnection,
    vision: Arc<dyn VisionAi>,
    config: AppConfig,
) -> AppState {
    AppState {
        db: db.clone(),
        blob: Arc::new(MockBlobStorage),
        vision,
        tokens: Arc::new(TokenService::new(
            config.jwt_secret.clone(),
            config.jwt_previous_secret.clone(),
        )),
        sessions: Arc::new(SessionService::new(db.clone())),
        cache: Arc::new(AnalysisCache::new(db.clone())),
        usage: Arc::new(UsageService::new(db.clone())),
        billing: Arc::new(BillingService::new(
            None,
            Some("whsec_test".to_string()),
            None,
        )),
        mailer: Arc::new(Mailer::new(None, None).unwrap()),
        config,
    }
}

pub async fn post_json(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn patch_json(app: &Router, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn delete(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn get_json(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {}", token));
    }

    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

/// Register a user and log in, returning (access_token, refresh_token).
pub async fn register_and_login(app: &Router, email: &str) -> (String, String) {
    let (status, _) = post_json(
        app,
        "/auth/register",
        None,
        serde_json::json!({"email": email, "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = post_json(
        app,
        "/auth/login",
        None,
        serde_json::json!({"email": email, "password": "password123"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    (
        body["access_token"].as_str().unwrap().to_string(),
        body["refresh_token"].as_str().unwrap().to_string(),
    )
}
