use crate::cli::ServeArgs;
use crate::infra::{AppState, Platform};
use crate::routes::with_platform_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pass_culture::config::AppConfig;
use pass_culture::error::AppError;
use pass_culture::store::InMemoryStore;
use pass_culture::telemetry;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let data_path = config.storage.data_path.clone();
    let store = Arc::new(InMemoryStore::load(&data_path).await?);
    let platform = Platform::build(&config, store)?;

    let app = with_platform_routes(&platform)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "pass culture api ready");

    let snapshots = spawn_snapshot_task(
        platform.store.clone(),
        data_path.clone(),
        config.storage.snapshot_interval,
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    readiness_flag.store(false, Ordering::Release);
    snapshots.abort();
    let _ = snapshots.await;
    platform.store.persist(&data_path).await?;
    info!(path = %data_path.display(), "store snapshot saved");
    Ok(())
}

/// Save the store snapshot every `period` until the task is aborted.
pub(crate) fn spawn_snapshot_task(
    store: Arc<InMemoryStore>,
    path: PathBuf,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match store.persist(&path).await {
                Ok(()) => debug!(path = %path.display(), "store snapshot saved"),
                Err(error) => warn!(%error, path = %path.display(), "periodic store snapshot failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for the shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
