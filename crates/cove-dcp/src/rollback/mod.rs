//! Rollback mitigation.
//!
//! Couchbase can ask a DCP consumer to roll its stream back to an earlier
//! sequence number after a failover. This subsystem keeps that from costing
//! anything: it continuously observes, per vBucket, the lowest sequence
//! number that every replica of the active history branch has durably
//! persisted, and publishes that value so the stream checkpoint never
//! advances past a point a failover could take away.
//!
//! The moving parts:
//!
//! - [`TopologyView`]: an immutable, versioned view of the routing table
//! - [`ConfigWatcher`](watcher::ConfigWatcher): polls the cluster and hands
//!   strictly newer topologies to the coordinator
//! - [`ReplicaVector`](state::ReplicaVector): per-generation replica
//!   bookkeeping and the safe-minimum fold
//! - [`Observer`](observer::Observer): the per-generation observe fan-out
//! - [`RollbackMitigation`]: the coordinator tying the above together
//!
//! Every topology change starts a new generation: the running observer is
//! stopped and drained, replica state is rebuilt from scratch, and a fresh
//! observer is spawned. In-flight observe replies carry the generation they
//! were issued under and are dropped when it is no longer the active one.

mod observer;
mod state;
mod topology;
mod watcher;

pub use topology::{ReplicaLocation, TopologyView};

use crate::bus::EventBus;
use crate::cluster::{ClusterClient, ConfigRev};
use crate::config::DcpConfig;
use crate::models::VbId;
use crate::observability::MitigationMetrics;
use crate::rollback::observer::{Observer, ObserverHandle};
use crate::rollback::state::ReplicaVector;
use crate::rollback::watcher::ConfigWatcher;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// State every observe task checks before touching anything: the sticky
/// closed flag and the generation currently in force.
pub(crate) struct Shared {
    closed: AtomicBool,
    generation: AtomicU64,
}

impl Shared {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Set the closed flag; returns the previous value. Never cleared.
    fn close(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn active_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}

#[derive(Default)]
struct Inner {
    topology: Option<Arc<TopologyView>>,
    observer: Option<ObserverHandle>,
    watcher: Option<JoinHandle<()>>,
}

/// Lifecycle coordinator of the rollback mitigation subsystem.
///
/// [`start`](Self::start) blocks until the first cluster config arrives,
/// performs the initial reconfiguration and leaves the config watcher and
/// observer running. [`stop`](Self::stop) shuts both down and only returns
/// once the observer has acknowledged.
///
/// Once the subsystem is running there is no error-return surface: transient
/// cluster errors are logged and retried on the next tick, and conditions the
/// subsystem cannot operate through (no first config, unreadable replica
/// count or placement, a failed failover-log fetch, a non-recoverable observe
/// error) panic after logging. No degraded mode exists; a checkpoint that
/// advances on stale information is worse than a halt.
pub struct RollbackMitigation {
    core: Arc<MitigationCore>,
}

impl RollbackMitigation {
    /// Create the subsystem for the given set of owned vBuckets.
    ///
    /// Nothing runs until [`start`](Self::start) is called. Callers check
    /// `config.rollback_mitigation.enabled` before constructing; a disabled
    /// subsystem is simply never instantiated.
    pub fn new(
        client: Arc<dyn ClusterClient>,
        config: &DcpConfig,
        vb_ids: Vec<VbId>,
        bus: Arc<EventBus>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            core: Arc::new(MitigationCore {
                client,
                config: config.clone(),
                bus,
                vb_ids,
                shared: Arc::new(Shared::new()),
                inner: Mutex::new(Inner::default()),
                shutdown_tx,
            }),
        }
    }

    /// Wait for the first cluster config, reconfigure, and leave the config
    /// watcher running.
    ///
    /// Panics when no config arrives within the connection timeout or the
    /// first topology cannot be read; there is nothing to mitigate against
    /// without one.
    pub async fn start(&self) {
        let core = &self.core;
        info!(
            interval = ?core.config.rollback_mitigation.interval,
            "rollback mitigation will start"
        );

        let snapshot = match core
            .client
            .wait_for_config_snapshot(core.config.connection_timeout)
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                error!(%err, "cannot get first config");
                panic!("first cluster config wait failed: {err}");
            }
        };

        let topology = match TopologyView::from_snapshot(snapshot) {
            Ok(topology) => topology,
            Err(err) => {
                error!(%err, "first config snapshot unusable");
                panic!("first cluster config unusable: {err}");
            }
        };

        let mut inner = core.inner.lock().await;
        inner.topology = Some(Arc::new(topology));
        core.reconfigure(&mut inner).await;

        let watcher = ConfigWatcher::new(
            Arc::clone(&core.client),
            Arc::downgrade(core),
            core.config.rollback_mitigation.config_watch_interval,
            core.shutdown_tx.subscribe(),
        );
        inner.watcher = Some(tokio::spawn(watcher.run()));
    }

    /// Shut down: stop the observer and wait for its ack, then release the
    /// config watcher. Idempotent; calls after the first are no-ops.
    pub async fn stop(&self) {
        self.core.stop().await;
    }

    /// The generation currently driving the observe fan-out. Zero until the
    /// first reconfiguration; strictly increasing afterwards.
    pub fn generation(&self) -> u64 {
        self.core.shared.active_generation()
    }
}

/// The coordinator state shared with the watcher task.
pub(crate) struct MitigationCore {
    client: Arc<dyn ClusterClient>,
    config: DcpConfig,
    bus: Arc<EventBus>,
    vb_ids: Vec<VbId>,
    shared: Arc<Shared>,
    inner: Mutex<Inner>,
    shutdown_tx: broadcast::Sender<()>,
}

impl MitigationCore {
    /// Version of the topology currently in force.
    pub(crate) async fn current_rev(&self) -> Option<ConfigRev> {
        self.inner.lock().await.topology.as_ref().map(|t| t.rev())
    }

    /// Install a new topology and reconfigure under it.
    pub(crate) async fn on_topology_change(&self, topology: TopologyView) {
        if self.shared.is_closed() {
            return;
        }

        let mut inner = self.inner.lock().await;
        if self.shared.is_closed() {
            return;
        }
        // The watcher already compared versions; re-check under the lock so
        // the invariant does not depend on the caller.
        if let Some(current) = &inner.topology {
            if !topology.is_strictly_newer_than(current) {
                return;
            }
        }

        inner.topology = Some(Arc::new(topology));
        self.reconfigure(&mut inner).await;
    }

    /// Tear down the running observer, rebuild replica state for the
    /// installed topology, and spawn the next generation's observer.
    ///
    /// Serial by construction: callers hold the `inner` lock and topology
    /// changes arrive from the single watcher task.
    async fn reconfigure(&self, inner: &mut Inner) {
        debug!("reconfigure triggered");

        if let Some(observer) = inner.observer.take() {
            observer.stop().await;
            debug!("observe close done");
        }

        let generation = self.shared.advance_generation();
        info!(generation, "new cluster config received");
        MitigationMetrics::increment_reconfigures();
        MitigationMetrics::set_active_generation(generation);

        let topology = inner
            .topology
            .as_ref()
            .expect("reconfigure without an installed topology")
            .clone();

        let vector = match ReplicaVector::for_topology(&topology, &self.vb_ids) {
            Ok(vector) => vector,
            Err(err) => {
                error!(%err, "cannot read replica count");
                panic!("replica count retrieval failed: {err}");
            }
        };

        if let Err(err) = vector.mark_absent_instances(&topology) {
            error!(%err, "cannot resolve replica placement");
            panic!("replica placement resolution failed: {err}");
        }

        inner.observer = Some(Observer::spawn(
            Arc::clone(&self.client),
            Arc::clone(&self.bus),
            Arc::new(vector),
            generation,
            Arc::clone(&self.shared),
            self.config.rollback_mitigation.interval,
        ));
    }

    async fn stop(&self) {
        if self.shared.close() {
            return;
        }
        let _ = self.shutdown_tx.send(());

        // Await the watcher without holding the state lock: it may be inside
        // an in-flight topology change that needs the lock to notice the
        // closed flag and bail out.
        let watcher = self.inner.lock().await.watcher.take();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }

        let observer = self.inner.lock().await.observer.take();
        if let Some(observer) = observer {
            observer.stop().await;
        }

        info!("rollback mitigation stopped");
    }
}
