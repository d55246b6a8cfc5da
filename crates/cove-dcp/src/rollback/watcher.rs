//! Periodic cluster topology poll.

use crate::cluster::ClusterClient;
use crate::rollback::topology::TopologyView;
use crate::rollback::MitigationCore;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Polls the cluster for routing table changes and hands strictly newer
/// topologies to the coordinator.
///
/// Runs as a single task, so reconfigurations it triggers are naturally
/// serial. Transient poll failures are skipped; the next tick retries.
pub(crate) struct ConfigWatcher {
    client: Arc<dyn ClusterClient>,
    mitigation: Weak<MitigationCore>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl ConfigWatcher {
    pub(crate) fn new(
        client: Arc<dyn ClusterClient>,
        mitigation: Weak<MitigationCore>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            client,
            mitigation,
            interval,
            shutdown,
        }
    }

    pub(crate) async fn run(self) {
        let Self {
            client,
            mitigation,
            interval,
            mut shutdown,
        } = self;

        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !Self::tick(&client, &mitigation).await {
                        return;
                    }
                }
                _ = shutdown.recv() => {
                    debug!("config watcher stopped");
                    return;
                }
            }
        }
    }

    /// One poll. Returns false once the owning coordinator is gone.
    async fn tick(client: &Arc<dyn ClusterClient>, mitigation: &Weak<MitigationCore>) -> bool {
        let Some(mitigation) = mitigation.upgrade() else {
            return false;
        };

        let snapshot = match client.config_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                debug!(%err, "config snapshot unavailable");
                return true;
            }
        };

        let topology = match TopologyView::from_snapshot(snapshot) {
            Ok(topology) => topology,
            Err(err) => {
                debug!(%err, "config snapshot not ready");
                return true;
            }
        };

        let newer = match mitigation.current_rev().await {
            None => true,
            Some(current) => topology.rev().is_strictly_newer_than(&current),
        };

        if newer {
            mitigation.on_topology_change(topology).await;
        }

        true
    }
}
