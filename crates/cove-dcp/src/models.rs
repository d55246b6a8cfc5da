//! Core value types shared across the DCP client.

use serde::{Deserialize, Serialize};

/// Identifier of a logical partition of the bucket key space.
///
/// A bucket has a fixed number of vBuckets (commonly 1024); the set owned by
/// one client process is decided at construction time.
pub type VbId = u16;

/// Sequence number within a (vBucket, vbUUID) history branch.
///
/// Monotonically non-decreasing for as long as the branch is active.
pub type SeqNo = u64;

/// Opaque identifier of a vBucket history branch. Changes on failover; equal
/// values across replicas mean the replicas share history.
pub type VbUuid = u64;

/// One entry of a vBucket failover log.
///
/// The cluster returns entries newest first; index 0 is the branch currently
/// active for the vBucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverEntry {
    /// History branch identifier.
    pub vb_uuid: VbUuid,
    /// Sequence number at which the branch started.
    pub seq_no: SeqNo,
}

/// Per-vBucket persisted-seqno update published on the event bus.
///
/// `seq_no` is the minimum sequence number persisted on every replica that
/// agrees on the active history branch. A value of 0 means no safe minimum is
/// known yet (warm-up, branch divergence, or all replicas absent) and
/// checkpoint advancement should hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistSeqNo {
    /// The vBucket the update applies to.
    pub vb_id: VbId,
    /// Minimum persisted sequence number across agreeing replicas.
    pub seq_no: SeqNo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persist_seqno_serializes_with_snake_case_fields() {
        let event = PersistSeqNo {
            vb_id: 42,
            seq_no: 100,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"vb_id\":42"));
        assert!(json.contains("\"seq_no\":100"));

        let back: PersistSeqNo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
