//! Diagnostics HTTP server

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::config::UiConfig;
use crate::engine::SharedEngine;
use crate::error::{ConfigError, Error};
use crate::ui::handlers;

/// State shared with every handler
pub struct AppState {
    pub engine: SharedEngine,
}

/// Read-only diagnostics API over the engine
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl WebServer {
    pub fn new(config: UiConfig, engine: SharedEngine) -> Self {
        Self {
            config,
            state: Arc::new(AppState { engine }),
            shutdown_tx: None,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/universes", get(handlers::get_universes))
            .route("/api/universes/deltas", get(handlers::get_deltas))
            .route("/api/universes/:id/channels", get(handlers::get_universe_channels))
            .route("/api/channels", get(handlers::get_channels))
            .route("/api/stats", get(handlers::get_stats))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, Error> {
        let addr = format!("{}:{}", self.config.bind_address, self.config.http_port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidBindAddress(addr).into())
    }

    /// Bind and serve on the current tokio runtime
    pub async fn start_background(&mut self) -> Result<JoinHandle<()>, Error> {
        let addr = self.bind_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let app = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        tracing::info!("Diagnostics API available at http://{}", listener.local_addr()?);

        Ok(tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Diagnostics API failed: {}", e);
            }
        }))
    }

    /// Ask a running server to finish its in-flight requests and exit
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
