//! # cove-dcp
//!
//! Async Rust client library for Couchbase's Database Change Protocol (DCP):
//! subscribe to the per-vBucket mutation stream of a bucket and receive
//! ordered change events with durable checkpointing and rollback protection.
//!
//! ## Rollback mitigation
//!
//! The heart of this crate is the [`rollback`] module. After a failover the
//! server may ask a consumer to roll its stream back to an earlier sequence
//! number; the mitigation subsystem makes that moment free by holding the
//! checkpoint at the lowest sequence number every replica of the active
//! history branch has durably persisted. It tracks the cluster topology,
//! restarts its observation whenever the topology changes, and publishes
//! per-vBucket safe minimums on the [`EventBus`].
//!
//! ```rust,ignore
//! use cove_dcp::{DcpConfig, EventBus, RollbackMitigation};
//! use cove_dcp::bus::topic;
//! use std::sync::Arc;
//!
//! # async fn example(client: Arc<dyn cove_dcp::ClusterClient>, vb_ids: Vec<u16>) {
//! let config = DcpConfig::default();
//! let bus = Arc::new(EventBus::new());
//! let mut safe_minimums = bus.subscribe(topic::PERSIST_SEQNO_CHANGED);
//!
//! let mitigation = RollbackMitigation::new(client, &config, vb_ids, bus);
//! mitigation.start().await;
//!
//! while let Ok(event) = safe_minimums.recv().await {
//!     // Clamp checkpoint advancement to the published seqno.
//! }
//! # }
//! ```
//!
//! ## Cluster seam
//!
//! The subsystem talks to Couchbase exclusively through the [`ClusterClient`]
//! trait, which keeps the SDK out of the core and makes the whole machine
//! testable against a scripted in-memory cluster.

pub mod bus;
pub mod cluster;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod rollback;

pub use bus::{BusEvent, EventBus};
pub use cluster::{
    ClusterClient, ConfigRev, ObserveOptions, ObserveResult, SnapshotHandle, TopologySnapshot,
};
pub use config::{DcpConfig, DcpConfigBuilder, RollbackMitigationConfig};
pub use error::{DcpError, Result};
pub use models::{FailoverEntry, PersistSeqNo, SeqNo, VbId, VbUuid};
pub use rollback::{ReplicaLocation, RollbackMitigation, TopologyView};
