//! Typed protocol errors
//!
//! Most fallible paths return `anyhow::Result` with context strings, matching
//! how the rest of the crate reports failures. The variants here exist for
//! the cases a caller is expected to distinguish programmatically: a bounded
//! receive that elapsed, a misconfigured pool, a peer speaking the wrong
//! protocol version. They travel inside `anyhow::Error` and can be recovered
//! with `downcast_ref`.

use crate::protocol::Rank;
use std::time::Duration;
use thiserror::Error;

/// Errors with a defined meaning to callers of the pool protocol.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A deadline-bounded receive saw no matching message in time.
    #[error("receive timed out after {0:?}")]
    ReceiveTimeout(Duration),

    /// `Coordinator::reports` was called but the run was configured with
    /// `retain_reports = false`.
    #[error("reports were not retained for this run")]
    ReportsNotRetained,

    /// The pool has no worker ranks but the backlog is non-empty, so the
    /// run could never complete.
    #[error("pool has no workers to dispatch the backlog to")]
    NoWorkers,

    /// Handshake with a peer that speaks a different protocol version.
    #[error("protocol version mismatch: local {local}, peer {peer}")]
    VersionMismatch { local: u32, peer: u32 },

    /// A send addressed a rank outside the pool.
    #[error("rank {rank} is outside a pool of size {size}")]
    RankOutOfRange { rank: Rank, size: usize },

    /// A worker tried to address a rank other than the coordinator. Workers
    /// never talk to their peers.
    #[error("workers may only address the coordinator, not rank {0}")]
    NotCoordinator(Rank),
}
