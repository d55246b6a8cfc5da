//! Cluster client seam.
//!
//! Everything the DCP internals need from the underlying Couchbase SDK is
//! expressed through the [`ClusterClient`] trait, so the heavy agent can be
//! replaced by a scripted in-memory implementation in tests.

use crate::error::Result;
use crate::models::{FailoverEntry, SeqNo, VbId, VbUuid};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Version of a cluster routing table.
///
/// `epoch` advances on cluster-wide transitions, `rev_id` within an epoch.
/// During rebalance the cluster may briefly replay older revisions, so
/// consumers must only ever act on strictly newer versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigRev {
    /// Config epoch.
    pub epoch: i64,
    /// Revision within the epoch.
    pub rev_id: i64,
}

impl ConfigRev {
    /// Strict version order; equal revisions compare false.
    pub fn is_strictly_newer_than(&self, other: &ConfigRev) -> bool {
        if self.epoch != other.epoch {
            return self.epoch > other.epoch;
        }
        self.rev_id > other.rev_id
    }
}

/// A point-in-time view of the cluster routing table.
///
/// Implementations expose the config revision directly rather than making
/// consumers dig it out of SDK internals.
pub trait TopologySnapshot: Send + Sync {
    /// Version of this routing table. Fails with
    /// [`DcpError::TopologyUnavailable`](crate::DcpError::TopologyUnavailable)
    /// while the snapshot is not yet populated.
    fn rev(&self) -> Result<ConfigRev>;

    /// Number of replica copies per vBucket, not counting the active.
    fn num_replicas(&self) -> Result<u32>;

    /// Server index holding the given replica of the given vBucket.
    ///
    /// Returns [`DcpError::InvalidReplica`](crate::DcpError::InvalidReplica)
    /// when the replica does not exist in this topology, and a negative index
    /// when the replica exists but is not assigned to any server.
    fn vbucket_to_server(&self, vb_id: VbId, replica: u32) -> Result<i32>;
}

/// Shared handle to a [`TopologySnapshot`].
pub type SnapshotHandle = Arc<dyn TopologySnapshot>;

/// Parameters of a persisted-state observe query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveOptions {
    /// The vBucket to observe.
    pub vb_id: VbId,
    /// Replica index, 0 being the active copy.
    pub replica_idx: u32,
    /// History branch the caller expects the replica to be on.
    pub vb_uuid: VbUuid,
}

/// Reply to a persisted-state observe query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveResult {
    /// Highest sequence number durably written on the replying replica.
    pub persist_seq_no: SeqNo,
    /// History branch the replica is actually on.
    pub vb_uuid: VbUuid,
}

/// Operations the DCP client needs from the cluster SDK.
#[async_trait]
pub trait ClusterClient: Send + Sync + 'static {
    /// Non-blocking read of the current routing table.
    fn config_snapshot(&self) -> Result<SnapshotHandle>;

    /// Block up to `timeout` for the first routing table after connect.
    async fn wait_for_config_snapshot(&self, timeout: Duration) -> Result<SnapshotHandle>;

    /// Full failover history of a vBucket, newest branch first.
    async fn failover_logs(&self, vb_id: VbId) -> Result<Vec<FailoverEntry>>;

    /// Query the persisted state of one replica of one vBucket.
    ///
    /// A [`DcpError::TemporaryFailure`](crate::DcpError::TemporaryFailure)
    /// reply is retriable; any other error means the agent is unusable.
    async fn observe_vb(&self, opts: ObserveOptions) -> Result<ObserveResult>;
}
