use dotenvy::dotenv;
use protein_scan_backend::config::AppConfig;
use protein_scan_backend::infrastructure::{database, storage};
use protein_scan_backend::services::analysis_cache::AnalysisCache;
use protein_scan_backend::services::billing::BillingService;
use protein_scan_backend::services::mailer::Mailer;
use protein_scan_backend::services::session::SessionService;
use protein_scan_backend::services::token::TokenService;
use protein_scan_backend::services::usage::UsageService;
use protein_scan_backend::services::vision::HttpVisionAi;
use protein_scan_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "protein_scan_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Protein Scan Backend...");

    let config = AppConfig::from_env();

    // Setup Infrastructure
    let db = database::setup_database().await?;
    let blob = storage::setup_storage().await;

    let vision = Arc::new(HttpVisionAi::new(
        config.vision_api_url.clone(),
        config.vision_api_key.clone(),
    ));
    info!("🔍 Vision AI: {}", config.vision_api_url);

    let billing = Arc::new(BillingService::new(
        config.billing_secret_key.clone(),
        config.billing_webhook_secret.clone(),
        config.billing_price_id.clone(),
    ));
    if !billing.is_configured() {
        tracing::warn!("💳 Billing not configured; checkout endpoints will fail");
    }

    let mailer = Arc::new(Mailer::new(
        config.smtp_url.as_deref(),
        config.email_from.clone(),
    )?);
    if !mailer.is_configured() {
        info!("📧 SMTP not configured; emails will be logged to the console");
    }

    let state = AppState {
        db: db.clone(),
        blob,
        vision,
        tokens: Arc::new(TokenService::new(
            config.jwt_secret.clone(),
            config.jwt_previous_secret.clone(),
        )),
        sessions: Arc::new(SessionService::new(db.clone())),
        cache: Arc::new(AnalysisCache::new(db.clone())),
        usage: Arc::new(UsageService::new(db.clone())),
        billing,
        mailer,
        config: config.clone(),
    };

    let app = create_app(state).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                // The id is generated further in; recorded on the way out
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = tracing::field::Empty,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 span: &tracing::Span| {
                    if let Some(request_id) = response
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                    {
                        span.record("request_id", request_id);
                    }
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
