use webai_server::router;
use webai_server::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use webai_core::client::rotation::spawn_cookie_persister;
use webai_core::config::ConfigStore;
use webai_core::notify::LogNotifier;
use webai_core::upstream::web::GeminiWebConnector;
use webai_core::ClientManager;

const PORT_ENV: &str = "WEBAI_PORT";
const DEFAULT_PORT: u16 = 8000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(ConfigStore::load(ConfigStore::default_path()).await?);
    tracing::info!("Config loaded from {}", config.path().display());

    let client = Arc::new(ClientManager::new(Arc::new(GeminiWebConnector), config.clone()));
    if !client.initialize().await {
        // The server still comes up; requests return the recorded failure
        // until credentials are fixed and the process restarted.
        let status = client.status().await;
        tracing::warn!(
            "Starting without a live Gemini session ({:?}: {})",
            status.error_code,
            status.error.unwrap_or_default()
        );
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let persister = spawn_cookie_persister(client.clone(), config.clone(), shutdown_rx);

    let app = router::build_router(AppState {
        client,
        config,
        notifier: Arc::new(LogNotifier),
    });

    let port = std::env::var(PORT_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    let _ = shutdown_tx.send(true);
    let _ = persister.await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}
