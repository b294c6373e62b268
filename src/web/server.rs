//! Web server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;

use crate::config::{format_bind_addr, Config};

use super::handlers::AppState;
use super::router::create_router;

/// HTTP server for the API and the UI.
pub struct WebServer {
    /// Bind address as `host:port`.
    addr: String,
    router: Router,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &Config, app_state: AppState) -> Self {
        let router = create_router(Arc::new(app_state), config).layer(CompressionLayer::new());

        Self {
            addr: format_bind_addr(&config.web.host, config.web.port),
            router,
        }
    }

    /// Bind, serve in the background and return the bound address.
    ///
    /// Binding errors are returned; port 0 picks an ephemeral port.
    pub async fn run_with_addr(self) -> Result<SocketAddr, std::io::Error> {
        let listener = TcpListener::bind(&self.addr).await?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, self.router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}
