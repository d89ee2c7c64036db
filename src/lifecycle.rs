//! Lifecycle controller: owns the poller task and the shutdown handshake.

use crate::poller::Poller;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

pub struct Controller {
    shutdown_tx: watch::Sender<()>,
    handle: JoinHandle<()>,
    grace: Duration,
}

impl Controller {
    /// Spawn the poll loop. Call this only once the store is migrated and the
    /// notifier has passed its readiness probe, so no cycle ever observes a
    /// half-initialized collaborator.
    pub fn start(poller: Poller, grace: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let handle = tokio::spawn(async move { poller.run(shutdown_rx).await });
        info!("poller started");
        Self {
            shutdown_tx,
            handle,
            grace,
        }
    }

    /// Signal shutdown, then wait up to the grace period for in-flight checks
    /// to finish — a check that has already delivered must get the chance to
    /// record its resolution. The task is aborted once grace runs out.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(());
        match time::timeout(self.grace, &mut self.handle).await {
            Ok(Ok(())) => info!("poller stopped cleanly"),
            Ok(Err(err)) => warn!(?err, "poller task failed during shutdown"),
            Err(_) => {
                warn!(grace = ?self.grace, "shutdown grace exceeded; aborting in-flight checks");
                self.handle.abort();
            }
        }
    }
}
