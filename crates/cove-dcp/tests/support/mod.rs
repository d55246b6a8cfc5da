//! Scripted in-memory cluster for driving the rollback mitigation subsystem.
#![allow(dead_code)]

use async_trait::async_trait;
use cove_dcp::{
    ClusterClient, ConfigRev, DcpError, FailoverEntry, ObserveOptions, ObserveResult, Result,
    SnapshotHandle, TopologySnapshot, VbId, VbUuid,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Once, RwLock};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initialize test logging (idempotent).
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("cove_dcp=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// History branch every vBucket starts on unless a test scripts otherwise.
pub const DEFAULT_BRANCH: VbUuid = 0xAAAA;

/// A routing table the tests install wholesale.
pub struct FakeTopology {
    rev: ConfigRev,
    num_replicas: u32,
    missing: HashSet<(VbId, u32)>,
    unassigned: HashSet<(VbId, u32)>,
}

impl FakeTopology {
    pub fn new(epoch: i64, rev_id: i64, num_replicas: u32) -> Self {
        Self {
            rev: ConfigRev { epoch, rev_id },
            num_replicas,
            missing: HashSet::new(),
            unassigned: HashSet::new(),
        }
    }

    /// Declare that a replica does not exist in this topology.
    pub fn missing(mut self, vb_id: VbId, replica: u32) -> Self {
        self.missing.insert((vb_id, replica));
        self
    }

    /// Declare that a replica exists but is not placed on any server.
    pub fn unassigned(mut self, vb_id: VbId, replica: u32) -> Self {
        self.unassigned.insert((vb_id, replica));
        self
    }
}

impl TopologySnapshot for FakeTopology {
    fn rev(&self) -> Result<ConfigRev> {
        Ok(self.rev)
    }

    fn num_replicas(&self) -> Result<u32> {
        Ok(self.num_replicas)
    }

    fn vbucket_to_server(&self, vb_id: VbId, replica: u32) -> Result<i32> {
        if self.missing.contains(&(vb_id, replica)) {
            return Err(DcpError::invalid_replica(vb_id, replica));
        }
        if self.unassigned.contains(&(vb_id, replica)) {
            return Ok(-1);
        }
        Ok(replica as i32)
    }
}

#[derive(Clone)]
struct Reply {
    result: ObserveResult,
    delay: Duration,
}

/// Cluster client whose replies are scripted per (vBucket, replica).
///
/// Unscripted observes park for an hour, standing in for a reply that never
/// arrives within a test's lifetime.
pub struct ScriptedCluster {
    topology: RwLock<Option<Arc<FakeTopology>>>,
    replies: Mutex<HashMap<(VbId, u32), Reply>>,
    observed: Mutex<Vec<ObserveOptions>>,
    failover: Mutex<HashMap<VbId, Vec<FailoverEntry>>>,
    polls: AtomicU64,
}

impl ScriptedCluster {
    pub fn new() -> Self {
        Self {
            topology: RwLock::new(None),
            replies: Mutex::new(HashMap::new()),
            observed: Mutex::new(Vec::new()),
            failover: Mutex::new(HashMap::new()),
            polls: AtomicU64::new(0),
        }
    }

    pub fn install_topology(&self, topology: FakeTopology) {
        *self.topology.write().unwrap() = Some(Arc::new(topology));
    }

    pub fn script_reply(&self, vb_id: VbId, replica: u32, vb_uuid: VbUuid, persist_seq_no: u64) {
        self.script_delayed_reply(vb_id, replica, vb_uuid, persist_seq_no, Duration::ZERO);
    }

    pub fn script_delayed_reply(
        &self,
        vb_id: VbId,
        replica: u32,
        vb_uuid: VbUuid,
        persist_seq_no: u64,
        delay: Duration,
    ) {
        self.replies.lock().unwrap().insert(
            (vb_id, replica),
            Reply {
                result: ObserveResult {
                    persist_seq_no,
                    vb_uuid,
                },
                delay,
            },
        );
    }

    pub fn clear_replies(&self) {
        self.replies.lock().unwrap().clear();
    }

    pub fn set_failover(&self, vb_id: VbId, entries: Vec<FailoverEntry>) {
        self.failover.lock().unwrap().insert(vb_id, entries);
    }

    /// Every observe issued so far, in issue order.
    pub fn observed(&self) -> Vec<ObserveOptions> {
        self.observed.lock().unwrap().clone()
    }

    pub fn observe_count(&self) -> usize {
        self.observed.lock().unwrap().len()
    }

    /// Number of non-blocking config polls served.
    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Acquire)
    }
}

impl Default for ScriptedCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterClient for ScriptedCluster {
    fn config_snapshot(&self) -> Result<SnapshotHandle> {
        self.polls.fetch_add(1, Ordering::AcqRel);
        match &*self.topology.read().unwrap() {
            Some(topology) => {
                let handle: SnapshotHandle = Arc::clone(topology) as SnapshotHandle;
                Ok(handle)
            }
            None => Err(DcpError::TopologyUnavailable),
        }
    }

    async fn wait_for_config_snapshot(&self, timeout: Duration) -> Result<SnapshotHandle> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Ok(snapshot) = self.config_snapshot() {
                return Ok(snapshot);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DcpError::timeout("no cluster config within deadline"));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn failover_logs(&self, vb_id: VbId) -> Result<Vec<FailoverEntry>> {
        Ok(self
            .failover
            .lock()
            .unwrap()
            .get(&vb_id)
            .cloned()
            .unwrap_or_else(|| {
                vec![FailoverEntry {
                    vb_uuid: DEFAULT_BRANCH,
                    seq_no: 0,
                }]
            }))
    }

    async fn observe_vb(&self, opts: ObserveOptions) -> Result<ObserveResult> {
        self.observed.lock().unwrap().push(opts);

        let reply = self
            .replies
            .lock()
            .unwrap()
            .get(&(opts.vb_id, opts.replica_idx))
            .cloned();

        match reply {
            Some(reply) => {
                if reply.delay > Duration::ZERO {
                    tokio::time::sleep(reply.delay).await;
                }
                Ok(reply.result)
            }
            None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DcpError::temporary("unscripted observe"))
            }
        }
    }
}
