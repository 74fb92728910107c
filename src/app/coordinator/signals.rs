//! Signal handling for graceful shutdown
//!
//! Ctrl-C and SIGTERM shut the orchestrator down: queued and running
//! downloads end in `error` and no new requests are accepted. Listeners on
//! the shutdown channel are notified afterwards.

use std::sync::Arc;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::Orchestrator;

/// Signal handler that shuts an orchestrator down
pub struct SignalHandler {
    shutdown_tx: broadcast::Sender<()>,
}

impl SignalHandler {
    /// Create a new signal handler with the given shutdown broadcaster
    pub fn new(shutdown_tx: broadcast::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    /// Watch for Ctrl-C / SIGTERM in the background
    ///
    /// On the first signal the orchestrator is shut down and a shutdown
    /// notification is broadcast to all subscribers.
    pub fn setup(&self, orchestrator: Arc<Orchestrator>) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();

        tokio::spawn(async move {
            let signal_name = wait_for_signal().await;
            info!("Received {}, cancelling downloads", signal_name);

            orchestrator.shutdown();
            let _ = shutdown_tx.send(());
        })
    }
}

/// Resolve on the first termination signal, returning its name
async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Ctrl+C",
        _ = terminate => "SIGTERM",
    }
}

/// Create a shutdown signal broadcaster
pub fn create_shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(1)
}

/// Wait until a shutdown has been broadcast
pub async fn wait_for_shutdown_signal(mut shutdown_rx: broadcast::Receiver<()>) {
    let _ = shutdown_rx.recv().await;
}
