use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use master::{handlers, monitor, state::AppState, DispatchConfig, Dispatcher};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info,axum=info")),
        )
        .init();

    let config = DispatchConfig::from_env()?;
    info!(
        "pools: dropq={:?} ogusa={:?}",
        config.dropq_workers.hosts(),
        config.ogusa_workers.hosts()
    );

    let dispatcher = Dispatcher::from_config(&config)?;
    let state = AppState::new(dispatcher, config.poll_interval);

    // router HTTP
    let app = handlers::build_router(state.clone());

    // seguimiento de barridos en segundo plano
    let monitor_state = state.clone();
    tokio::spawn(async move {
        monitor::monitor_sweeps(monitor_state).await;
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.bind_addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
