use anyhow::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::core::config::Config;
use crate::core::store::Store;
use crate::interfaces::web::{ApiServer, ApiServerConfig};
use crate::logging::SseMakeWriter;
use crate::platform::{NativePlatform, Platform};

/// Foreground engine: structured logging, store bootstrap, API server.
/// `webedt gateway start` runs this in a background child process.
pub async fn run_engine(api_host: String, api_port: u16) -> Result<()> {
    let (log_tx, _) = tokio::sync::broadcast::channel::<String>(500);
    let make_writer = SseMakeWriter {
        sender: log_tx.clone(),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Ignore err in restart loop

    let config = Config::from_env();
    info!(
        "Starting webedt gateway (coding worker at {})...",
        config.worker_url
    );

    let store = Store::open(NativePlatform::data_dir()).await?;

    let server = ApiServer::new(ApiServerConfig {
        store,
        worker_url: config.worker_url,
        log_tx,
        api_host,
        api_port,
    });

    tokio::select! {
        res = server.run() => res,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down gateway...");
            Ok(())
        }
    }
}
