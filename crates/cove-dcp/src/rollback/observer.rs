//! Per-generation persisted-state observer.
//!
//! One observer runs per topology generation. On every tick it fans out an
//! observe query for each replica that exists under its topology, folds the
//! replies into the generation's [`ReplicaVector`], and publishes the
//! recomputed per-vBucket safe minimum on the bus. Replies that arrive after
//! the generation has been superseded are discarded without touching state.

use crate::bus::{topic, BusEvent, EventBus};
use crate::cluster::{ClusterClient, ObserveOptions};
use crate::models::{PersistSeqNo, VbId, VbUuid};
use crate::observability::MitigationMetrics;
use crate::rollback::state::ReplicaVector;
use crate::rollback::Shared;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

/// Coordinator-side handle to a running observer.
pub(crate) struct ObserverHandle {
    stop_tx: mpsc::Sender<()>,
    done_rx: mpsc::Receiver<()>,
}

impl ObserverHandle {
    /// Signal the observer to stop and wait until its loop has exited.
    ///
    /// The stop/done pair are capacity-1 channels: the signal never blocks
    /// and the ack arrives exactly once. A dropped sender (the observer task
    /// died) counts as acknowledged so the caller cannot hang.
    pub(crate) async fn stop(mut self) {
        let _ = self.stop_tx.send(()).await;
        let _ = self.done_rx.recv().await;
    }
}

pub(crate) struct Observer {
    client: Arc<dyn ClusterClient>,
    bus: Arc<EventBus>,
    vector: Arc<ReplicaVector>,
    /// Expected active history branch per vBucket, seeded from the failover
    /// log and updated when a replica reports a newer branch. Owned by this
    /// generation; replies from older generations never reach it.
    vb_uuids: DashMap<VbId, VbUuid>,
    generation: u64,
    shared: Arc<Shared>,
    interval: Duration,
}

impl Observer {
    /// Spawn the observer task for one generation.
    pub(crate) fn spawn(
        client: Arc<dyn ClusterClient>,
        bus: Arc<EventBus>,
        vector: Arc<ReplicaVector>,
        generation: u64,
        shared: Arc<Shared>,
        interval: Duration,
    ) -> ObserverHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(1);

        let observer = Arc::new(Self {
            client,
            bus,
            vector,
            vb_uuids: DashMap::new(),
            generation,
            shared,
            interval,
        });
        tokio::spawn(observer.run(stop_rx, done_tx));

        ObserverHandle { stop_tx, done_rx }
    }

    async fn run(self: Arc<Self>, mut stop_rx: mpsc::Receiver<()>, done_tx: mpsc::Sender<()>) {
        self.load_vb_uuid_map().await;

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => Arc::clone(&self).fan_out(),
                _ = stop_rx.recv() => {
                    debug!(generation = self.generation, "observe close triggered");
                    let _ = done_tx.send(()).await;
                    return;
                }
            }
        }
    }

    /// Seed the expected history branch of every owned vBucket from the head
    /// of its failover log. Without this baseline no observe query can name a
    /// branch, so failure here is unrecoverable.
    async fn load_vb_uuid_map(&self) {
        for vb_id in self.vector.vb_ids() {
            let logs = match self.client.failover_logs(vb_id).await {
                Ok(logs) => logs,
                Err(err) => {
                    error!(vb_id, %err, "cannot fetch failover logs");
                    panic!("failover log fetch failed for vbucket {vb_id}: {err}");
                }
            };

            let Some(current) = logs.first() else {
                error!(vb_id, "empty failover log");
                panic!("empty failover log for vbucket {vb_id}");
            };

            self.vb_uuids.insert(vb_id, current.vb_uuid);
            debug!(
                vb_id,
                vb_uuid = current.vb_uuid,
                history = ?logs,
                "observing vbucket"
            );
        }
    }

    /// Issue one observe query per existing replica slot. Stops early and
    /// drains when the subsystem closed or the generation moved on.
    fn fan_out(self: Arc<Self>) {
        for (vb_id, replica) in self.vector.present_slots() {
            if self.shared.is_closed() || self.shared.active_generation() != self.generation {
                debug!(
                    closed = self.shared.is_closed(),
                    generation = self.generation,
                    active = self.shared.active_generation(),
                    "stopping observe fan-out"
                );
                return;
            }

            let vb_uuid = self.vb_uuids.get(&vb_id).map(|u| *u).unwrap_or_default();
            Arc::clone(&self).observe(vb_id, replica, vb_uuid);
        }
    }

    fn observe(self: Arc<Self>, vb_id: VbId, replica: usize, vb_uuid: VbUuid) {
        let this = self;
        tokio::spawn(async move {
            let reply = this
                .client
                .observe_vb(ObserveOptions {
                    vb_id,
                    replica_idx: replica as u32,
                    vb_uuid,
                })
                .await;

            if this.shared.is_closed() || this.shared.active_generation() != this.generation {
                debug!(
                    vb_id,
                    replica,
                    generation = this.generation,
                    active = this.shared.active_generation(),
                    "dropping stale observe reply"
                );
                return;
            }

            let result = match reply {
                Ok(result) => result,
                Err(err) if err.is_temporary() => {
                    warn!(vb_id, replica, %err, "observe failed");
                    MitigationMetrics::increment_observe_errors();
                    return;
                }
                Err(err) => {
                    error!(vb_id, replica, %err, "observe failed with non-recoverable error");
                    panic!("observe failed for vbucket {vb_id} replica {replica}: {err}");
                }
            };

            if !this
                .vector
                .update(vb_id, replica, result.persist_seq_no, result.vb_uuid)
            {
                return;
            }

            let event = PersistSeqNo {
                vb_id,
                seq_no: this.vector.min_seq_no(vb_id),
            };
            this.bus
                .publish(topic::PERSIST_SEQNO_CHANGED, BusEvent::PersistSeqNoChanged(event));
            MitigationMetrics::increment_persist_seqno_events();

            // The replica moved to a new history branch; follow it on the
            // next fan-out.
            if vb_uuid != result.vb_uuid {
                this.vb_uuids.insert(vb_id, result.vb_uuid);
            }
        });
    }
}
