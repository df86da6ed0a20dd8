//! Signal-driven cooperative shutdown
//!
//! One coordinator owns the cancellation channel. The first interrupt
//! triggers cancellation exactly once; repeated signals are logged and
//! otherwise ignored, so a flood of Ctrl-C presses cannot re-run teardown.

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::info;

pub struct ShutdownCoordinator {
    cancel_tx: watch::Sender<bool>,
    fired: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            cancel_tx,
            fired: AtomicBool::new(false),
        }
    }

    /// Cancellation signal for a worker task to select on.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }

    /// Request shutdown. Returns true the first time only.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            info!("Shutdown already in progress, ignoring repeated signal");
            return false;
        }
        info!("Shutdown requested, cancelling pollers and aggregator");
        let _ = self.cancel_tx.send(true);
        true
    }

    /// Listen for interrupt signals until the process exits. Runs as the
    /// sole recipient of Ctrl-C and, on unix, SIGTERM.
    pub async fn listen(self) {
        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");

        loop {
            #[cfg(unix)]
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = terminate.recv() => {}
            }

            #[cfg(not(unix))]
            if tokio::signal::ctrl_c().await.is_err() {
                break;
            }

            self.trigger();
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
