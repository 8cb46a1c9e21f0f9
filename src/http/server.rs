//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::service::{router, AppState};
use crate::error::{AkhbarnaError, Result};

/// HTTP server for the rate-limited portal routes.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Router state
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Start the HTTP server.
    ///
    /// This method will block until the server fails.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the HTTP server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = router(self.state)?;
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "Starting HTTP server");

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                AkhbarnaError::Server(e.to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{PolicyTable, SlidingWindowStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let store = Arc::new(SlidingWindowStore::new());
        let state = AppState::new(store, PolicyTable::presets());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let server = HttpServer::new(addr, state);

        let result = server.serve_with_shutdown(async {}).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_missing_policy_fails_before_binding() {
        let store = Arc::new(SlidingWindowStore::new());
        let state = AppState::new(store, PolicyTable::new());
        let server = HttpServer::new("127.0.0.1:0".parse().unwrap(), state);

        let result = server.serve().await;
        assert!(matches!(result, Err(AkhbarnaError::Config(_))));
    }
}
