mod logging;

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use reload_client::{ClientConfig, ReloadManager, Reloader, UnixSocketConnector};
use tracing::{error, info};

#[derive(Default)]
struct LoggingReloader {
    reloads: AtomicU64,
}

impl Reloader for LoggingReloader {
    fn reload(&self, hint: &str) {
        let count = self.reloads.fetch_add(1, Ordering::Relaxed) + 1;
        info!(hint, count, "reload received");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let manager = ReloadManager::new(
        config,
        UnixSocketConnector,
        Arc::new(LoggingReloader::default()),
    );
    if let Err(err) = manager.run().await {
        error!(error = %err, "unable to start reload client");
        return ExitCode::FAILURE;
    }

    tokio::select! {
        _ = manager.wait_for_shutdown() => info!("watcher ended the session"),
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            manager.close();
            manager.wait_for_shutdown().await;
        }
    }
    ExitCode::SUCCESS
}
