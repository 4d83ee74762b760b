use std::sync::Arc;

use llmguard_filter::{
    config::AppConfig,
    filter::InletFilter,
    http::{self, AppState},
};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    let filter = Arc::new(InletFilter::new(
        config.valves(),
        config.injection_scanner_builder(),
    ));
    filter.startup().await?;

    let app = http::router(AppState {
        filter: filter.clone(),
    });
    let listener = TcpListener::bind(config.http_bind).await?;
    info!("LLMGuard filter pipeline listening on {}", config.http_bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    filter.shutdown().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .init();
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal");
}
