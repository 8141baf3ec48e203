use anyhow::Context;
use tandem_relay::{app, config::RelayConfig, state::RelayState};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env();

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter `{}`", config.log_filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("failed to create data dir {}", config.data_dir.display()))?;

    let state = RelayState::new(&config);
    let app = app::build_router(state, config.cors_origins.as_deref());

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.listen_addr))?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        workspace_root = %config.workspace_root.display(),
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        "starting relay server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(app::shutdown_signal())
        .await
        .context("relay server exited unexpectedly")
}
