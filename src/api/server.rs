use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::routes::{build_router, ApiState};
use crate::errors::{Error, Result};

/// A running token endpoint.
pub struct TokenServer {
    local_addr: SocketAddr,
    draining: Arc<AtomicBool>,
    shutdown: CancellationToken,
    grace: Duration,
    task: JoinHandle<std::io::Result<()>>,
}

impl TokenServer {
    /// Bind `addr` and start serving on a background task.
    pub async fn bind(addr: &str, state: ApiState, grace: Duration) -> Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| Error::config(format!("Invalid token server address '{}': {}", addr, e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::transport(format!("Failed to bind token server: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::transport(format!("Failed to read token server address: {}", e)))?;

        let draining = Arc::new(AtomicBool::new(false));
        let router = build_router(state, draining.clone());
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();

        info!(address = %local_addr, "Starting token server");
        let task = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });

        Ok(Self { local_addr, draining, shutdown, grace, task })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, ask open connections to close and wait up to the
    /// grace period. The serving task is aborted when the grace expires.
    pub async fn shutdown(self) -> Result<()> {
        self.draining.store(true, Ordering::Release);
        self.shutdown.cancel();

        let mut task = self.task;
        match tokio::time::timeout(self.grace, &mut task).await {
            Ok(Ok(Ok(()))) => {
                info!(address = %self.local_addr, "Token server stopped");
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(Error::transport(format!("Token server error: {}", e))),
            Ok(Err(e)) => Err(Error::internal(format!("Token server task failed: {}", e))),
            Err(_) => {
                task.abort();
                warn!(
                    address = %self.local_addr,
                    grace = %humantime::format_duration(self.grace),
                    "Token server did not drain in time, dropping connections"
                );
                Err(Error::transport("Token server shutdown timed out"))
            }
        }
    }
}
