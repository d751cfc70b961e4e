//! Vitrine Engine - Main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vitrine_engine::api;
use vitrine_engine::app::{App, Repositories};
use vitrine_engine::infrastructure::{
    app_settings::ProviderSettings,
    clock::SystemClock,
    config::EngineConfig,
    file_store::LocalFileStore,
    persistence::SqliteStore,
    ports::{ClockPort, ProviderPort},
    provider_gateway::ProviderGateway,
    resilient_provider::ResilientProvider,
    settings::SqliteSettingsRepo,
};
use vitrine_engine::use_cases::PollSchedule;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from repo root (the engine may be started from `crates/engine`).
    load_dotenv_from_repo_root();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitrine_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Vitrine Engine");

    let config = EngineConfig::from_env();
    let clock: Arc<dyn ClockPort> = Arc::new(SystemClock::new());

    // Open the database and its tables
    tracing::info!(db = %config.db_path, "Opening SQLite store");
    let store = Arc::new(SqliteStore::open(&config.db_path).await?);
    let settings_repo =
        Arc::new(SqliteSettingsRepo::new(store.pool().clone(), clock.clone()).await?);

    let files = Arc::new(LocalFileStore::new(config.public_root.clone()));
    tracing::info!(root = %files.root().display(), "Serving artifacts from public root");

    // Provider selection is re-read per call; env only seeds defaults
    let defaults = ProviderSettings::from_env();
    tracing::info!(provider = %defaults.provider, "Default provider configured");
    let gateway = Arc::new(ProviderGateway::new(settings_repo.clone(), defaults));
    let provider: Arc<dyn ProviderPort> = Arc::new(ResilientProvider::new(gateway.clone()));

    let repositories = Repositories {
        scene: store.clone(),
        job: store.clone(),
        pattern: store.clone(),
        verification: store,
        settings: settings_repo,
        files,
    };
    let app = Arc::new(App::new(
        repositories,
        gateway,
        provider,
        clock,
        PollSchedule::with_timeout(config.video_poll_timeout),
    ));

    let mut router = api::http::routes()
        .with_state(app)
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer_from_env() {
        router = router.layer(cors);
    }

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn load_dotenv_from_repo_root() {
    let repo_root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..");

    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = repo_root.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}

fn build_cors_layer_from_env() -> Option<CorsLayer> {
    let allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())?;

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if allowed_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();

        if origins.is_empty() {
            return None;
        }

        cors = cors.allow_origin(origins);
    }

    Some(cors)
}
