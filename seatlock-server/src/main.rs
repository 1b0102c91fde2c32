//! `seatlock-server` binary: reads [`ServerConfig`] from the environment,
//! opens the configured store and serves the HTTP API until SIGINT/SIGTERM.

use std::error::Error;

use seatlock::RegistrationCoordinator;
use seatlock_memory::InMemoryStore;
use seatlock_postgres::PostgresStore;
use seatlock_server::{router, AppState, LogFormat, ServerConfig, ServerStore, StoreBackend};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ServerConfig::from_env()?;
    init_tracing(config.log_format);

    match &config.backend {
        StoreBackend::Postgres { database_url } => {
            let store = PostgresStore::with_config(database_url.as_str(), config.postgres.clone()).await?;
            store.migrate().await?;
            info!("[server.store_ready] backend=postgres");
            serve(store, &config).await
        }
        StoreBackend::Memory => {
            warn!("[server.store_ready] backend=memory; state is lost on restart");
            serve(InMemoryStore::with_config(config.memory), &config).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn serve<S: ServerStore>(store: S, config: &ServerConfig) -> Result<(), Box<dyn Error>> {
    let coordinator =
        RegistrationCoordinator::new(store).with_retry_policy(config.retry_policy.clone());
    let app = router(AppState::new(coordinator));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!(addr = %config.listen_addr, "[server.listening]");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("[server.stopped]");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "[server.signal_handler_failed] ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                warn!(%error, "[server.signal_handler_failed] sigterm");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("[server.shutdown_requested]");
}
