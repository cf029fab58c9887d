//! lap-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads the layered
//! config, connects the store, builds the shared state, wires middleware,
//! and starts the HTTP server. Route handlers live in `routes.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use lap_daemon::{notifier::BrokerNotifier, routes, state};
use lap_db::ApplyStore;
use lap_engine::Orchestrator;
use lap_hwctl::HttpDispatcher;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

/// Colon-separated list of YAML config paths, merged in order.
const ENV_CONFIG_PATHS: &str = "LAP_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "/etc/layout-apply/config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = std::env::var(ENV_CONFIG_PATHS).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let path_refs: Vec<&str> = paths.split(':').filter(|p| !p.is_empty()).collect();
    let config = Arc::new(lap_config::load(&path_refs).context("load configuration")?);
    info!(config_hash = %config.config_hash, "configuration loaded");

    let store = Arc::new(
        ApplyStore::connect(&config.db)
            .await
            .context("connect apply-state store")?,
    );
    store.migrate().await.context("run store migrations")?;

    let dispatcher = Arc::new(HttpDispatcher::new(Arc::clone(&config)));
    let orchestrator = Arc::new(
        Orchestrator::new(
            Arc::clone(&store),
            dispatcher,
            config.layout_apply.request.max_workers,
        )
        .with_notifier(Arc::new(BrokerNotifier::new(&config.message_broker))),
    );

    let shared = Arc::new(state::AppState::new(store, orchestrator));
    let app = routes::build_router(shared).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr: SocketAddr = format!("{}:{}", config.layout_apply.host, config.layout_apply.port)
        .parse()
        .context("layout_apply.host/port is not a valid bind address")?;
    info!("lap-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
