//! Versioned view of the cluster routing table.

use crate::cluster::{ConfigRev, SnapshotHandle};
use crate::error::Result;
use crate::models::VbId;

/// Where a replica of a vBucket lives under one topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaLocation {
    /// Hosted on the given server index.
    Server(usize),
    /// The replica slot exists but is not placed on any server right now
    /// (mid-rebalance).
    Unassigned,
    /// The topology has no such replica at all.
    Missing,
}

impl ReplicaLocation {
    /// Whether the replica can be observed under this topology.
    ///
    /// Both [`Unassigned`](Self::Unassigned) and [`Missing`](Self::Missing)
    /// replicas are treated as non-existent: there is no server to ask.
    pub fn exists(&self) -> bool {
        matches!(self, Self::Server(_))
    }
}

/// Immutable snapshot of the routing table in force for one generation.
///
/// Carries the config version used for strict-newness comparison and answers
/// replica placement queries. Installed wholesale on reconfigure, never
/// mutated.
#[derive(Clone)]
pub struct TopologyView {
    rev: ConfigRev,
    snapshot: SnapshotHandle,
}

impl TopologyView {
    /// Build a view from a cluster snapshot.
    ///
    /// Fails with [`DcpError::TopologyUnavailable`](crate::DcpError::TopologyUnavailable)
    /// while the snapshot has no routing table yet.
    pub fn from_snapshot(snapshot: SnapshotHandle) -> Result<Self> {
        let rev = snapshot.rev()?;
        Ok(Self { rev, snapshot })
    }

    /// Version of this view.
    pub fn rev(&self) -> ConfigRev {
        self.rev
    }

    /// Strict version order over (epoch, rev_id); equal views compare false.
    ///
    /// Clusters can briefly replay older configs during rebalance; acting on
    /// an equal or older view would cause reconfigure oscillation.
    pub fn is_strictly_newer_than(&self, other: &TopologyView) -> bool {
        self.rev.is_strictly_newer_than(&other.rev)
    }

    /// Number of replica copies per vBucket, not counting the active.
    pub fn num_replicas(&self) -> Result<u32> {
        self.snapshot.num_replicas()
    }

    /// Resolve where a replica of a vBucket lives.
    ///
    /// Maps the client's invalid-replica error and negative server indexes to
    /// [`ReplicaLocation::Missing`] and [`ReplicaLocation::Unassigned`]; any
    /// other client error propagates and is fatal to the reconfigure step.
    pub fn resolve_replica(&self, vb_id: VbId, replica: u32) -> Result<ReplicaLocation> {
        match self.snapshot.vbucket_to_server(vb_id, replica) {
            Ok(server) if server < 0 => Ok(ReplicaLocation::Unassigned),
            Ok(server) => Ok(ReplicaLocation::Server(server as usize)),
            Err(err) if err.is_invalid_replica() => Ok(ReplicaLocation::Missing),
            Err(err) => Err(err),
        }
    }
}

impl std::fmt::Debug for TopologyView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyView").field("rev", &self.rev).finish()
    }
}
