//! HTTP server.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info};

use super::handlers::router;
use super::state::AppState;
use crate::error::Result;

/// HTTP server for the gateway API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    state: AppState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self { addr, state }
    }

    /// Serve until `signal` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(addr = %self.addr, "HTTP server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformConfig;
    use crate::ratelimit::{InMemoryBackend, RateLimiter};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let config = PlatformConfig::default();
        let limiter = Arc::new(RateLimiter::new(Arc::new(InMemoryBackend::new()), 5, 60).unwrap());
        let state = AppState::from_config(&config, limiter);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

        let server = HttpServer::new(addr, state);
        server.serve_with_shutdown(async {}).await.unwrap();
    }
}
