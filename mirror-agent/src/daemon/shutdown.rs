//! Graceful shutdown handling for SIGTERM and SIGINT.
//!
//! A signal cancels the session token. The walker stops before the next
//! file and an in-flight chunk write is abandoned, leaving that file
//! unstamped for the next session.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown coordinator
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Cancel the session without waiting for a signal
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGTERM or SIGINT, then cancel.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Cannot install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    warn!("Cannot install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received SIGINT (Ctrl+C), stopping after the current file...");
            }
            _ = terminate => {
                info!("Received SIGTERM, stopping after the current file...");
            }
            _ = self.token.cancelled() => {
                return;
            }
        }

        self.trigger();
    }

    /// Listen for signals in the background until the token is cancelled.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.wait_for_signal().await })
    }
}

/// Await a background task. A panic or abort is logged, not propagated.
/// Returns whether the task finished normally.
pub async fn join_logged(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!("{} stopped abnormally: {}", name, e);
            false
        }
    }
}
