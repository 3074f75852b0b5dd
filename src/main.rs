//! ITAM Server - IT Asset Management
//!
//! REST API server for device inventory and assignment confirmation.

use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use itam_server::{
    api,
    config::AppConfig,
    repository::Repository,
    services::{documents::HtmlDocumentRenderer, email::SmtpMailer, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("itam_server={},tower_http=debug", config.logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting ITAM Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    let mailer = SmtpMailer::new(&config.email).context("Failed to configure SMTP transport")?;
    let renderer = HtmlDocumentRenderer::new(&config.documents);

    let repository = Repository::new(pool);
    let services = Services::new(repository, &config, Arc::new(mailer), Arc::new(renderer));

    services
        .auth
        .bootstrap_admin(&config.bootstrap)
        .await
        .context("Failed to create bootstrap administrator")?;

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    let state = AppState {
        config: Arc::new(config),
        services: Arc::new(services),
    };

    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Authentication
        .route("/auth/login", post(api::auth::login))
        .route("/auth/me", get(api::auth::me))
        // Devices
        .route("/devices", get(api::devices::list_devices).post(api::devices::create_device))
        .route("/devices/import", post(api::devices::import_devices))
        .route("/devices/metrics/counts", get(api::devices::device_counts))
        .route("/devices/issues/alerts", get(api::devices::device_alerts))
        .route("/devices/public/:code", get(api::devices::public_device))
        .route("/devices/:id", get(api::devices::get_device).delete(api::devices::delete_device))
        .route("/devices/:id/lifecycle", put(api::devices::update_lifecycle))
        .route("/devices/:id/maintenance", post(api::devices::mark_maintenance))
        // Assignments
        .route(
            "/assignments",
            get(api::assignments::list_assignments).post(api::assignments::create_assignment),
        )
        .route("/assignments/active", get(api::assignments::list_active_assignees))
        .route("/assignments/:id", delete(api::assignments::delete_assignment))
        .route("/assignments/:id/resend-email", post(api::assignments::resend_email))
        .route("/assignments/:id/cancel", post(api::assignments::cancel_assignment))
        // Confirmation (public, reached from the emailed link)
        .route(
            "/assignments/confirm",
            get(api::confirm::confirm_get).post(api::confirm::confirm_post),
        )
        .route("/assignments/confirm-resend", post(api::confirm::confirm_resend))
        .with_state(state.clone());

    // Generated hand-over documents
    let documents = &state.config.documents;
    let uploads_path = format!("/{}", documents.public_prefix.trim_matches('/'));
    let uploads = ServeDir::new(&documents.upload_dir);

    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api", api)
        .nest_service(&uploads_path, uploads)
        .merge(openapi)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors),
        )
}
