use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::config::ServerConfig;
use atelier_api::registry::JobRegistry;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_novelai::NovelAiClient;
use atelier_queue::{GenerationQueue, QueueConfig};
use atelier_store::AccessStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Whitelist/quota store ---
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("Failed to create data dir {}", config.data_dir))?;
    let snapshot_path = std::path::Path::new(&config.data_dir).join("whitelist.json");
    let store = Arc::new(
        AccessStore::open(&snapshot_path, config.default_daily_limit)
            .await
            .context("Failed to open whitelist snapshot")?,
    );
    tracing::info!(path = %snapshot_path.display(), "Whitelist store opened");

    // --- Generation backend ---
    let backend = Arc::new(
        NovelAiClient::new(config.nai_token.clone(), config.nai_proxy.as_deref())
            .context("Failed to build NovelAI client")?,
    );

    // --- Queue and dispatcher ---
    let queue_config = QueueConfig::new(config.min_dispatch_delay, config.max_dispatch_delay);
    let (queue, dispatcher) = GenerationQueue::new(Arc::clone(&store), backend, queue_config);

    let cancel = CancellationToken::new();
    let dispatcher_handle = tokio::spawn(dispatcher.run(cancel.clone()));

    // Log job lifecycle events.
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "Job event");
        }
    });

    // --- Application state and router ---
    let policy = Arc::new(config.policy());
    let state = AppState {
        store,
        queue,
        policy,
        jobs: JobRegistry::new(),
        config: Arc::new(config.clone()),
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!(%addr, "API server listening");

    let shutdown_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            shutdown_cancel.cancel();
        })
        .await
        .context("Server error")?;

    // Let the dispatcher drain reserved jobs before exiting.
    cancel.cancel();
    dispatcher_handle.await.ok();
    tracing::info!("Shutdown complete");

    Ok(())
}
