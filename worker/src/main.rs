use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use worker::{build_router, StubConfig, StubState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("worker=debug,reqwest=info")),
        )
        .init();

    let config = StubConfig::from_env()?;

    // Nombre de host (solo para info)
    let hostname_str = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    info!(
        "worker de prueba en {} (espera {} polls, nodo caído: {})",
        hostname_str, config.wait_polls, config.node_down
    );

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind_addr))?;
    info!("worker escuchando en {}", listener.local_addr()?);

    let app = build_router(StubState::new(config));
    axum::serve(listener, app).await?;
    Ok(())
}
