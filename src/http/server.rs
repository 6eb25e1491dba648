//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::middleware::gate_middleware;
use crate::error::Result;
use crate::gate::RequestGate;

/// HTTP server with the request gate in front of an application router.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// The gate every request passes through
    gate: Arc<RequestGate>,
    /// Routes served behind the gate
    app: Router,
}

impl HttpServer {
    /// Create a new server for `app`.
    pub fn new(addr: SocketAddr, gate: Arc<RequestGate>, app: Router) -> Self {
        Self { addr, gate, app }
    }

    /// The full router: `app` wrapped in the gate layer.
    pub fn router(&self) -> Router {
        gated(self.app.clone(), Arc::clone(&self.gate))
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            e
        })?;

        info!(
            addr = %self.addr,
            "Starting HTTP server with graceful shutdown"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
            .map_err(|e| {
                error!(error = %e, "HTTP server failed");
                e.into()
            })
    }
}

/// Wrap `app` so every route passes through `gate`.
pub fn gated(app: Router, gate: Arc<RequestGate>) -> Router {
    app.layer(axum::middleware::from_fn_with_state(gate, gate_middleware))
}
