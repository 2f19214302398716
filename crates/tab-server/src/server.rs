use std::sync::Arc;

use tab_notify::{BroadcastNotifier, Notifier};
use tab_service::{ReceiptRecognizer, StaticRecognizer, TabService};
use tab_store::{InMemoryLedger, LedgerStore};
use tokio::net::TcpListener;

use crate::config::{ServerConfig, TabConfig};
use crate::error::ServerResult;
use crate::router::build_router;
use crate::staging::PhotoStaging;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TabService>,
    pub events: Arc<BroadcastNotifier>,
    pub photos: Arc<PhotoStaging>,
    pub config: Arc<ServerConfig>,
}

/// TabSplit HTTP server over an in-memory ledger.
pub struct TabServer {
    config: TabConfig,
    state: AppState,
}

impl TabServer {
    /// A server whose receipt uploads fail until a recognizer is wired in.
    pub fn new(config: TabConfig) -> Self {
        Self::with_recognizer(config, Arc::new(StaticRecognizer::unavailable()))
    }

    pub fn with_recognizer(config: TabConfig, recognizer: Arc<dyn ReceiptRecognizer>) -> Self {
        let store: Arc<dyn LedgerStore> = Arc::new(InMemoryLedger::new());
        let events = Arc::new(BroadcastNotifier::new(config.server.event_buffer));
        let notifier: Arc<dyn Notifier> = events.clone();

        let service = TabService::new(store, notifier)
            .with_config(config.service.clone())
            .with_lifecycle(config.lifecycle.clone())
            .with_engine(config.engine.clone())
            .with_recognizer(recognizer);

        let state = AppState {
            service: Arc::new(service),
            events,
            photos: Arc::new(PhotoStaging::new(
                config.server.max_upload_bytes,
                config.server.max_staged_photos,
            )),
            config: Arc::new(config.server.clone()),
        };
        Self { config, state }
    }

    pub fn config(&self) -> &TabConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(self.config.server.bind_addr).await?;
        tracing::info!(addr = %self.config.server.bind_addr, "TabSplit server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        tracing::info!("TabSplit server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = TabServer::new(TabConfig::default());
        assert_eq!(
            server.config().server.bind_addr,
            "127.0.0.1:8080".parse().unwrap()
        );
        assert_eq!(server.state().service.config().invite_token_len, 8);
    }

    #[test]
    fn router_builds() {
        let server = TabServer::new(TabConfig::default());
        let _router = server.router();
    }
}
