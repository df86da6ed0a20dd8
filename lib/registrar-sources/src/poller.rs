//! Publish-on-change polling
//!
//! A `Poller` drives one `SnapshotSource` on a fixed interval and publishes
//! a snapshot only when it differs from the previously published one. The
//! channel is a `tokio::sync::watch` slot, so delivery is latest-value: a
//! slow aggregator may miss intermediate snapshots but never sees them out
//! of order.

use async_trait::async_trait;
use registrar_core::{snapshots_equal, Result, Snapshot};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One origin of registration snapshots.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce a complete candidate snapshot from the origin.
    async fn fetch(&self) -> Result<Snapshot>;
}

/// Outcome of a single fetch cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The candidate differed from the previous snapshot and was published.
    Published(usize),
    /// The candidate was semantically identical; nothing was sent.
    Unchanged,
    /// The fetch failed; the previously published snapshot stands.
    Failed,
}

/// Drives one source: fetch on every tick, publish only on change.
pub struct Poller<S> {
    source: S,
    tx: watch::Sender<Snapshot>,
    previous: Snapshot,
}

impl<S: SnapshotSource> Poller<S> {
    pub fn new(source: S, tx: watch::Sender<Snapshot>) -> Self {
        Self {
            source,
            tx,
            previous: Snapshot::new(),
        }
    }

    /// One fetch cycle. Fetch failures are never fatal: the cycle is
    /// skipped and the previously published snapshot stays in effect until
    /// the next tick.
    pub async fn cycle(&mut self) -> CycleOutcome {
        let candidate = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    "{} fetch failed, keeping previous snapshot: {}",
                    self.source.name(),
                    e
                );
                return CycleOutcome::Failed;
            }
        };

        if snapshots_equal(&candidate, &self.previous) {
            debug!(
                "{} snapshot unchanged ({} registrations)",
                self.source.name(),
                candidate.len()
            );
            return CycleOutcome::Unchanged;
        }

        let count = candidate.len();
        info!(
            "{} snapshot changed: publishing {} registrations",
            self.source.name(),
            count
        );
        self.previous = candidate.clone();
        // Send only fails when the aggregator is gone, i.e. during shutdown.
        let _ = self.tx.send(candidate);
        CycleOutcome::Published(count)
    }

    /// Poll until cancelled. An in-flight fetch is dropped, not awaited,
    /// when the cancellation signal arrives.
    pub async fn run(mut self, interval: Duration, mut cancel: watch::Receiver<bool>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "{} poller started, polling every {:?}",
            self.source.name(),
            interval
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.cycle() => {}
                        _ = cancel.changed() => break,
                    }
                }
                _ = cancel.changed() => break,
            }
        }

        info!("{} poller stopped", self.source.name());
    }
}
