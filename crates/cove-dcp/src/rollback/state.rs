//! Per-replica persisted-state bookkeeping.

use crate::error::Result;
use crate::models::{SeqNo, VbId, VbUuid};
use crate::rollback::topology::TopologyView;
use dashmap::DashMap;
use tracing::{debug, error};

/// Last reported persisted state of one replica of one vBucket.
///
/// Plain mutable value; synchronization comes from the owning
/// [`ReplicaVector`]'s per-shard locks. When `absent` is set the value fields
/// are meaningless and must be ignored.
#[derive(Debug, Default)]
pub(crate) struct ReplicaState {
    vb_uuid: VbUuid,
    seq_no: SeqNo,
    absent: bool,
}

impl ReplicaState {
    pub(crate) fn mark_absent(&mut self) {
        self.absent = true;
    }

    pub(crate) fn is_absent(&self) -> bool {
        self.absent
    }

    pub(crate) fn set_seq_no(&mut self, seq_no: SeqNo) {
        self.seq_no = seq_no;
    }

    pub(crate) fn set_vb_uuid(&mut self, vb_uuid: VbUuid) {
        self.vb_uuid = vb_uuid;
    }

    pub(crate) fn vb_uuid(&self) -> VbUuid {
        self.vb_uuid
    }

    pub(crate) fn seq_no(&self) -> SeqNo {
        self.seq_no
    }
}

/// Replica states of every owned vBucket for one generation.
///
/// Each vBucket maps to `num_replicas + 1` slots, index 0 being the active
/// copy. The whole structure is allocated fresh on reconfigure and discarded
/// with its generation, so observe results from an older generation can never
/// surface in a newer one.
#[derive(Debug)]
pub(crate) struct ReplicaVector {
    slots: DashMap<VbId, Vec<ReplicaState>>,
}

impl ReplicaVector {
    /// Allocate zeroed replica slots for every owned vBucket under the given
    /// topology. Fails when the replica count cannot be read.
    pub(crate) fn for_topology(topology: &TopologyView, vb_ids: &[VbId]) -> Result<Self> {
        let replicas = topology.num_replicas()? as usize;

        let slots = DashMap::with_capacity(vb_ids.len());
        for &vb_id in vb_ids {
            let mut states = Vec::with_capacity(replicas + 1);
            states.resize_with(replicas + 1, ReplicaState::default);
            slots.insert(vb_id, states);
        }

        Ok(Self { slots })
    }

    /// Mark every slot whose replica does not exist under `topology` absent.
    ///
    /// Missing and unassigned replicas are expected during rebalance; any
    /// other resolution error aborts the reconfigure step.
    pub(crate) fn mark_absent_instances(&self, topology: &TopologyView) -> Result<()> {
        for mut entry in self.slots.iter_mut() {
            let vb_id = *entry.key();
            for (idx, state) in entry.value_mut().iter_mut().enumerate() {
                let location = topology.resolve_replica(vb_id, idx as u32)?;
                if !location.exists() {
                    debug!(vb_id, replica = idx, ?location, "marking replica absent");
                    state.mark_absent();
                }
            }
        }
        Ok(())
    }

    /// The safe minimum persisted seqno for a vBucket.
    ///
    /// Zero when every replica is absent, or when the non-absent replicas
    /// disagree on their history branch: no safe minimum exists then, and
    /// zero can never cause the checkpoint to over-advance.
    pub(crate) fn min_seq_no(&self, vb_id: VbId) -> SeqNo {
        let Some(replicas) = self.slots.get(&vb_id) else {
            error!(vb_id, "no replica states for vbucket");
            return 0;
        };

        let Some(start) = replicas.iter().position(|r| !r.is_absent()) else {
            error!(vb_id, "all replicas absent");
            return 0;
        };

        let vb_uuid = replicas[start].vb_uuid();
        let mut min_seq_no = replicas[start].seq_no();

        for (idx, replica) in replicas.iter().enumerate().skip(start + 1) {
            if replica.is_absent() {
                continue;
            }

            if replica.vb_uuid() != vb_uuid {
                debug!(
                    vb_id,
                    replica = idx,
                    expected = vb_uuid,
                    reported = replica.vb_uuid(),
                    "vbuuid mismatch across replicas"
                );
                return 0;
            }

            min_seq_no = min_seq_no.min(replica.seq_no());
        }

        min_seq_no
    }

    /// Record an observe reply for one replica slot.
    ///
    /// Returns false when the vBucket or replica index is unknown, which
    /// happens when a reply straggles in from a wider, older topology.
    pub(crate) fn update(
        &self,
        vb_id: VbId,
        replica: usize,
        seq_no: SeqNo,
        vb_uuid: VbUuid,
    ) -> bool {
        let Some(mut replicas) = self.slots.get_mut(&vb_id) else {
            error!(vb_id, "no replica states for vbucket");
            return false;
        };

        let Some(state) = replicas.get_mut(replica) else {
            error!(vb_id, replica, "replica index out of range");
            return false;
        };

        state.set_seq_no(seq_no);
        state.set_vb_uuid(vb_uuid);
        true
    }

    /// All (vBucket, replica index) pairs that exist under this generation's
    /// topology, in no particular order. Absent slots are excluded and are
    /// therefore never observed.
    pub(crate) fn present_slots(&self) -> Vec<(VbId, usize)> {
        let mut out = Vec::new();
        for entry in self.slots.iter() {
            for (idx, state) in entry.value().iter().enumerate() {
                if !state.is_absent() {
                    out.push((*entry.key(), idx));
                }
            }
        }
        out
    }

    /// The vBuckets this vector tracks.
    pub(crate) fn vb_ids(&self) -> Vec<VbId> {
        self.slots.iter().map(|e| *e.key()).collect()
    }
}
