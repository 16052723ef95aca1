pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::AppConfig;
use crate::services::analysis_cache::AnalysisCache;
use crate::services::billing::BillingService;
use crate::services::mailer::Mailer;
use crate::services::session::SessionService;
use crate::services::storage::BlobStorage;
use crate::services::token::TokenService;
use crate::services::usage::UsageService;
use crate::services::vision::VisionAi;
use axum::{
    Router,
    http::HeaderValue,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::refresh,
        api::handlers::auth::logout,
        api::handlers::auth::forgot_password,
        api::handlers::auth::reset_password,
        api::handlers::auth::verify_email,
        api::handlers::auth::list_sessions,
        api::handlers::uploads::create_upload_url,
        api::handlers::analyses::analyze,
        api::handlers::analyses::list_analyses,
        api::handlers::analyses::get_analysis,
        api::handlers::analyses::update_analysis,
        api::handlers::analyses::delete_analysis,
        api::handlers::analyses::get_shared_analysis,
        api::handlers::billing::create_checkout,
        api::handlers::billing::create_portal,
        api::handlers::billing::billing_webhook,
        api::handlers::users::get_profile,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::RegisterRequest,
            api::handlers::auth::LoginRequest,
            api::handlers::auth::TokenPairResponse,
            api::handlers::auth::RefreshRequest,
            api::handlers::auth::ForgotPasswordRequest,
            api::handlers::auth::ResetPasswordRequest,
            api::handlers::auth::VerifyEmailRequest,
            api::handlers::auth::SessionInfo,
            api::handlers::uploads::UploadUrlRequest,
            api::handlers::uploads::UploadUrlResponse,
            api::handlers::analyses::AnalyzeRequest,
            api::handlers::analyses::AnalysisResponse,
            api::handlers::analyses::FoodItemResponse,
            api::handlers::analyses::UpdateAnalysisRequest,
            api::handlers::billing::BillingUrlResponse,
            api::handlers::users::UserProfileResponse,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "auth", description = "Authentication and session endpoints"),
        (name = "uploads", description = "Presigned upload URLs"),
        (name = "analyses", description = "Meal analysis endpoints"),
        (name = "billing", description = "Subscription billing endpoints"),
        (name = "users", description = "Profile endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub blob: Arc<dyn BlobStorage>,
    pub vision: Arc<dyn VisionAi>,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionService>,
    pub cache: Arc<AnalysisCache>,
    pub usage: Arc<UsageService>,
    pub billing: Arc<BillingService>,
    pub mailer: Arc<Mailer>,
    pub config: AppConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/auth/register", post(api::handlers::auth::register))
        .route("/auth/login", post(api::handlers::auth::login))
        .route("/auth/refresh", post(api::handlers::auth::refresh))
        .route("/auth/logout", post(api::handlers::auth::logout))
        .route(
            "/auth/forgot-password",
            post(api::handlers::auth::forgot_password),
        )
        .route(
            "/auth/reset-password",
            post(api::handlers::auth::reset_password),
        )
        .route(
            "/auth/verify-email",
            post(api::handlers::auth::verify_email),
        )
        .route(
            "/auth/sessions",
            get(api::handlers::auth::list_sessions).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/uploads",
            post(api::handlers::uploads::create_upload_url).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/analyses",
            post(api::handlers::analyses::analyze)
                .get(api::handlers::analyses::list_analyses)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/analyses/:id",
            get(api::handlers::analyses::get_analysis)
                .patch(api::handlers::analyses::update_analysis)
                .delete(api::handlers::analyses::delete_analysis)
                .layer(from_fn_with_state(
                    state.clone(),
                    api::middleware::auth::auth_middleware,
                )),
        )
        .route(
            "/shared/:share_id",
            get(api::handlers::analyses::get_shared_analysis),
        )
        .route(
            "/billing/checkout",
            post(api::handlers::billing::create_checkout).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/billing/portal",
            post(api::handlers::billing::create_portal).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .route(
            "/webhooks/billing",
            post(api::handlers::billing::billing_webhook),
        )
        .route(
            "/users/me",
            get(api::handlers::users::get_profile).layer(from_fn_with_state(
                state.clone(),
                api::middleware::auth::auth_middleware,
            )),
        )
        .layer(cors_layer(&state.config.allowed_origins))
        // Outermost, so even CORS preflight responses carry the id
        .layer(from_fn(api::middleware::request_id::request_id_middleware))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
