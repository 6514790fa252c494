pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::Result;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::relay::worker::WorkerClient;
use crate::core::store::Store;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Store,
    pub(crate) worker: WorkerClient,
    pub(crate) worker_url: String,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_host: String,
    pub(crate) api_port: u16,
}

pub struct ApiServerConfig {
    pub store: Store,
    pub worker_url: String,
    pub log_tx: tokio::sync::broadcast::Sender<String>,
    pub api_host: String,
    pub api_port: u16,
}

pub struct ApiServer {
    config: ApiServerConfig,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig) -> Self {
        Self { config }
    }

    /// Bind and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.config.api_host, self.config.api_port);
        let state = AppState {
            store: self.config.store,
            worker: WorkerClient::new(&self.config.worker_url),
            worker_url: self.config.worker_url,
            log_tx: self.config.log_tx,
            api_host: self.config.api_host,
            api_port: self.config.api_port,
        };
        let app = router::build_api_router(state);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API Server running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

// --- SSE Logs (used by router) ---

pub(crate) async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| {
        match msg {
            Ok(log) => Ok(Event::default().data(log)), // SSE properly encodes this
            Err(_) => Ok(Event::default().data("Log stream lagged")),
        }
    });

    Sse::new(stream)
}
