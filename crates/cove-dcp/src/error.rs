//! Error types for DCP client operations.
//!
//! Errors are split into transient failures that the caller retries on the
//! next tick and everything else. The rollback mitigation subsystem has no
//! error-return surface once started: transient errors are logged and
//! swallowed, fatal ones panic.

use crate::models::VbId;
use thiserror::Error;

/// DCP client errors.
#[derive(Error, Debug)]
pub enum DcpError {
    /// The cluster has not delivered a routing table yet.
    #[error("cluster topology unavailable")]
    TopologyUnavailable,

    /// The server is momentarily unable to answer; retry on the next tick.
    #[error("temporary failure: {0}")]
    TemporaryFailure(String),

    /// The requested replica does not exist in the current topology.
    #[error("invalid replica {replica} for vbucket {vb_id}")]
    InvalidReplica { vb_id: VbId, replica: u32 },

    /// Deadline elapsed while waiting on the cluster.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Cluster client failure that is not known to be transient.
    #[error("cluster error: {0}")]
    Cluster(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DcpError {
    /// Create a temporary failure error.
    pub fn temporary(msg: impl Into<String>) -> Self {
        Self::TemporaryFailure(msg.into())
    }

    /// Create an invalid replica error.
    pub fn invalid_replica(vb_id: VbId, replica: u32) -> Self {
        Self::InvalidReplica { vb_id, replica }
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a cluster error.
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::Cluster(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the operation may succeed if simply retried later.
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::TemporaryFailure(_) => true,
            Self::Io(e) => {
                use std::io::ErrorKind;
                matches!(
                    e.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::TimedOut
                        | ErrorKind::Interrupted
                )
            }
            Self::TopologyUnavailable
            | Self::InvalidReplica { .. }
            | Self::Timeout(_)
            | Self::Cluster(_)
            | Self::Config(_) => false,
        }
    }

    /// Whether this is the invalid-replica condition.
    pub fn is_invalid_replica(&self) -> bool {
        matches!(self, Self::InvalidReplica { .. })
    }
}

/// Result type for DCP client operations.
pub type Result<T> = std::result::Result<T, DcpError>;
