mod config;
mod errors;
mod models;
mod pagination;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::pagination::session::spawn_idle_sweeper;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on unparsable env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pager v{}", env!("CARGO_PKG_VERSION"));

    let settings = &config.pagination;
    info!(
        usable_height_pt = settings.budget.usable_height_pt(),
        px_to_pt = settings.budget.px_to_pt,
        debounce_ms = settings.debounce.as_millis() as u64,
        smart_breaks = settings.break_config.enable_smart_breaks,
        force_break_after = ?settings.break_config.force_break_after,
        force_break_after_titles = ?settings.break_config.force_break_after_titles,
        session_ttl_secs = config.session_ttl.as_secs(),
        "Pagination settings loaded"
    );

    let state = AppState::new(config.clone());
    spawn_idle_sweeper(state.sessions.clone(), config.session_ttl);

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }
    info!(origins = ?config.allowed_origins, "Restricting CORS origins");
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(config.allowed_origins.clone()))
        .allow_methods(Any)
        .allow_headers(Any)
}
