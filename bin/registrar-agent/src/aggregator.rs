//! Debounced reconciliation of the three source snapshots
//!
//! The aggregator is the sole owner of merged registration state. Inbound
//! snapshots only mark their source dirty; actual reconciliation happens on
//! a fixed tick, so a burst of updates across sources coalesces into one
//! pass. The registry is written only when the merged view really changed.

use registrar_core::{snapshot_fingerprint, snapshots_equal, Snapshot};
use registrar_sources::RegistryClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

struct SourceState {
    rx: watch::Receiver<Snapshot>,
    latest: Snapshot,
    dirty: bool,
    open: bool,
}

impl SourceState {
    fn new(rx: watch::Receiver<Snapshot>) -> Self {
        Self {
            rx,
            latest: Snapshot::new(),
            dirty: false,
            open: true,
        }
    }

    fn on_changed(&mut self, res: Result<(), watch::error::RecvError>, name: &str) {
        match res {
            Ok(()) => {
                self.latest = self.rx.borrow_and_update().clone();
                self.dirty = true;
                debug!(
                    "{} snapshot received ({} registrations)",
                    name,
                    self.latest.len()
                );
            }
            Err(_) => {
                // Disabled or stopped poller; its last snapshot stands.
                debug!("{} channel closed", name);
                self.open = false;
            }
        }
    }
}

pub struct Aggregator {
    cluster: SourceState,
    local: SourceState,
    registry: SourceState,
    last_view: Snapshot,
    writer: Arc<dyn RegistryClient>,
}

impl Aggregator {
    pub fn new(
        cluster_rx: watch::Receiver<Snapshot>,
        local_rx: watch::Receiver<Snapshot>,
        registry_rx: watch::Receiver<Snapshot>,
        writer: Arc<dyn RegistryClient>,
    ) -> Self {
        Self {
            cluster: SourceState::new(cluster_rx),
            local: SourceState::new(local_rx),
            registry: SourceState::new(registry_rx),
            last_view: Snapshot::new(),
            writer,
        }
    }

    /// One reconciliation pass. No dirty source means nothing to do; an
    /// unchanged merged view means no write. A failed write re-marks every
    /// source dirty so the next tick retries, never faster than the tick.
    async fn reconcile(&mut self) {
        if !(self.cluster.dirty || self.local.dirty || self.registry.dirty) {
            return;
        }
        self.cluster.dirty = false;
        self.local.dirty = false;
        self.registry.dirty = false;

        let mut desired = Snapshot::with_capacity(
            self.cluster.latest.len() + self.local.latest.len() + self.registry.latest.len(),
        );
        desired.extend_from_slice(&self.cluster.latest);
        desired.extend_from_slice(&self.local.latest);
        desired.extend_from_slice(&self.registry.latest);

        if snapshots_equal(&desired, &self.last_view) {
            debug!("Merged view unchanged ({} registrations)", desired.len());
            return;
        }

        match self.writer.write_desired(&desired).await {
            Ok(()) => {
                info!(
                    "Reconciled {} desired registrations (fingerprint {:016x})",
                    desired.len(),
                    snapshot_fingerprint(&desired)
                );
                self.last_view = desired;
            }
            Err(e) => {
                warn!("Registry write failed, retrying next tick: {}", e);
                self.cluster.dirty = true;
                self.local.dirty = true;
                self.registry.dirty = true;
            }
        }
    }

    /// Run until cancelled. Snapshot arrivals never reconcile directly;
    /// only the tick does. An in-flight pass finishes before the
    /// cancellation signal is observed again.
    pub async fn run(mut self, interval: Duration, mut cancel: watch::Receiver<bool>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Aggregator started, reconciling every {:?}", interval);

        loop {
            tokio::select! {
                _ = cancel.changed() => break,
                res = self.cluster.rx.changed(), if self.cluster.open => {
                    self.cluster.on_changed(res, "cluster");
                }
                res = self.local.rx.changed(), if self.local.open => {
                    self.local.on_changed(res, "local");
                }
                res = self.registry.rx.changed(), if self.registry.open => {
                    self.registry.on_changed(res, "registry");
                }
                _ = ticker.tick() => self.reconcile().await,
            }
        }

        info!("Aggregator stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use registrar_core::{BackendAddress, CoreError, Registration, Result};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn registration(service: &str, ip: &str, port: u16, name: &str) -> Registration {
        Registration {
            service: service.to_string(),
            instance: format!("{}-1", service),
            address: BackendAddress {
                host: format!("{}-1", service),
                namespace: "default".to_string(),
                node: "node-a".to_string(),
                ip: ip.to_string(),
                port,
            },
            registration_name: name.to_string(),
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        writes: Mutex<Vec<Snapshot>>,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl RegistryClient for RecordingWriter {
        async fn fetch_current(&self) -> Result<Snapshot> {
            Ok(Snapshot::new())
        }

        async fn write_desired(&self, desired: &[Registration]) -> Result<()> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(CoreError::Internal("registry unavailable".to_string()));
            }
            self.writes.lock().unwrap().push(desired.to_vec());
            Ok(())
        }
    }

    struct Channels {
        cluster: watch::Sender<Snapshot>,
        local: watch::Sender<Snapshot>,
        registry: watch::Sender<Snapshot>,
    }

    fn aggregator() -> (Aggregator, Channels, Arc<RecordingWriter>) {
        let (cluster_tx, cluster_rx) = watch::channel(Snapshot::new());
        let (local_tx, local_rx) = watch::channel(Snapshot::new());
        let (registry_tx, registry_rx) = watch::channel(Snapshot::new());
        let writer = Arc::new(RecordingWriter::default());
        let aggregator = Aggregator::new(cluster_rx, local_rx, registry_rx, writer.clone());
        (
            aggregator,
            Channels {
                cluster: cluster_tx,
                local: local_tx,
                registry: registry_tx,
            },
            writer,
        )
    }

    #[tokio::test]
    async fn test_clean_tick_does_nothing() {
        let (mut aggregator, _channels, writer) = aggregator();
        aggregator.reconcile().await;
        assert!(writer.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_burst_of_updates_reconciles_once() {
        let (mut aggregator, _channels, writer) = aggregator();

        // Three sources publish within the same debounce window.
        aggregator.cluster.latest = vec![registration("a", "10.0.0.1", 8080, "a.main")];
        aggregator.cluster.dirty = true;
        aggregator.local.latest = vec![registration("b", "192.168.0.1", 9090, "b.main")];
        aggregator.local.dirty = true;
        aggregator.registry.dirty = true;

        aggregator.reconcile().await;

        let writes = writer.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 2);
    }

    #[tokio::test]
    async fn test_single_cluster_registration_scenario() {
        let (mut aggregator, _channels, writer) = aggregator();
        let reg = registration("a", "10.0.0.1", 8080, "a.main");

        aggregator.cluster.latest = vec![reg.clone()];
        aggregator.cluster.dirty = true;
        aggregator.reconcile().await;

        assert_eq!(*writer.writes.lock().unwrap(), vec![vec![reg.clone()]]);

        // Idle tick: flags are clear, nothing happens.
        aggregator.reconcile().await;
        assert_eq!(writer.writes.lock().unwrap().len(), 1);

        // An identical re-publish marks the source dirty again but the
        // merged view is unchanged, so no second write.
        aggregator.cluster.latest = vec![reg];
        aggregator.cluster.dirty = true;
        aggregator.reconcile().await;
        assert_eq!(writer.writes.lock().unwrap().len(), 1);
        assert!(!aggregator.cluster.dirty);
    }

    #[tokio::test]
    async fn test_failed_write_retries_on_next_tick() {
        let (mut aggregator, _channels, writer) = aggregator();
        writer.fail_next.store(true, Ordering::SeqCst);

        aggregator.cluster.latest = vec![registration("a", "10.0.0.1", 8080, "a.main")];
        aggregator.cluster.dirty = true;
        aggregator.reconcile().await;

        // The write failed: nothing recorded, sources dirty again.
        assert!(writer.writes.lock().unwrap().is_empty());
        assert!(aggregator.cluster.dirty);

        aggregator.reconcile().await;
        assert_eq!(writer.writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_loop_debounces_and_writes() {
        let (aggregator, channels, writer) = aggregator();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = tokio::spawn(aggregator.run(Duration::from_millis(20), cancel_rx));

        channels
            .cluster
            .send(vec![registration("a", "10.0.0.1", 8080, "a.main")])
            .unwrap();
        channels.local.send(Snapshot::new()).unwrap();
        channels.registry.send(Snapshot::new()).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("aggregator did not stop after cancellation")
            .unwrap();

        let writes = writer.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len(), 1);
        assert_eq!(writes[0][0].service, "a");
    }
}
