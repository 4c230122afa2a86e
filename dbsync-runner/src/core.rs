use std::path::PathBuf;

use dbsync::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use dbsync::run::{RunResult, SyncCoordinator};
use dbsync::source::sql::SqlSource;
use tracing::{info, warn};

use crate::error::{RunnerError, RunnerResult};

/// Runs one sync against the database and API described by `config_path`.
///
/// Ctrl+C (and SIGTERM on unix) cancel the run gracefully: no new batch is dispatched and the
/// run is recorded as cancelled.
pub async fn start_sync(config_path: PathBuf, log_dir: PathBuf) -> RunnerResult<RunResult> {
    let (shutdown_tx, _) = create_shutdown_channel();
    let signal_handle = tokio::spawn(listen_for_shutdown(shutdown_tx.clone()));

    let mut coordinator = SyncCoordinator::new(SqlSource::new(), config_path, log_dir, shutdown_tx);
    let result = coordinator.run().await;

    signal_handle.abort();

    result.map_err(RunnerError::from)
}

async fn listen_for_shutdown(shutdown_tx: ShutdownTx) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(error = %err, "failed to register sigterm handler");
                wait_for_ctrl_c().await;
                shutdown_tx.shutdown();
                return;
            }
        };

        tokio::select! {
            _ = wait_for_ctrl_c() => {}
            _ = sigterm.recv() => {
                info!("sigterm received, cancelling sync");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;

    shutdown_tx.shutdown();
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("sigint (ctrl+c) received, cancelling sync"),
        Err(err) => {
            warn!(error = %err, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    }
}
