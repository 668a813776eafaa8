use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cookoff::{
    api, auth, broadcast, config::AppConfig, state::AppState, store::MemoryStore, ws,
};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cookoff=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Cookoff...");

    let config = AppConfig::from_env();
    let auth_config = Arc::new(auth::AdminAuthConfig::from_env());

    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::new()),
        config.game_config(),
    ));

    if let Some(path) = &config.snapshot {
        match state.load_snapshot(path).await {
            Ok(()) => tracing::info!("Loaded snapshot from {}", path.display()),
            Err(e) => tracing::error!("Failed to load snapshot {}: {}", path.display(), e),
        }
    }

    // Completes and archives rounds once their last evaluation lands
    broadcast::spawn_round_finalizer(state.clone());

    let admin_routes = api::admin_routes().layer(middleware::from_fn_with_state(
        auth_config.clone(),
        auth::admin_auth_middleware,
    ));

    let ws_routes = Router::new()
        .route("/ws", get(ws::ws_handler))
        .layer(middleware::from_fn_with_state(
            auth_config.clone(),
            auth::admin_ws_auth_middleware,
        ));

    let app = Router::new()
        .merge(ws_routes)
        .merge(admin_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Listening on http://{}", config.bind);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, app).await
}
