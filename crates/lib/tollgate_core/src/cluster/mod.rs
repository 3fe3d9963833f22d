//! Highly-available storage routing.
//!
//! A [`ClusterRouter`] owns a fixed set of database nodes, probes each one
//! on an interval, and answers "which node is the primary" and "which node
//! should serve this read" from the latest probe snapshot.

pub mod pg;
pub mod router;
pub mod tracker;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use router::{ClusterRouter, RouterOptions};
pub use tracker::ClusterSnapshot;

/// Routing errors.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster unavailable: no primary confirmed within {0:?}")]
    Unavailable(Duration),

    #[error("primary node is unavailable")]
    NoPrimary,

    #[error("no healthy node is available")]
    NoNodeAvailable,

    #[error("probe of {address} failed: {reason}")]
    Probe { address: String, reason: String },
}

/// Role a node reported on its last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Primary,
    Standby,
    Unknown,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Primary => "primary",
            NodeRole::Standby => "standby",
            NodeRole::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Last known state of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatus {
    pub address: String,
    pub role: NodeRole,
    pub healthy: bool,
}

/// A database node the router can probe and hand out.
#[async_trait]
pub trait DbNode: Send + Sync + 'static {
    /// Stable address used in logs and snapshots.
    fn address(&self) -> &str;

    /// Lightweight role query.
    async fn check_role(&self) -> Result<NodeRole, ClusterError>;

    /// Release every connection held for this node.
    async fn close(&self);
}
