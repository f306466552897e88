//! pullpool - pull-based work distribution over ranked message passing
//!
//! pullpool coordinates a fixed pool of processes: one coordinator (rank 0)
//! owns a backlog of opaque work items and hands them out one at a time;
//! workers (ranks 1..N) execute a caller-supplied task and report back.
//! Workers that finish faster pull proportionally more work, which is the
//! whole load-balancing story: there is no scheduler beyond "send the next
//! item to whoever just reported".
//!
//! # Architecture
//!
//! - **Transport**: rank-addressed send/probe/consume, over TCP between
//!   processes or in-memory within one process
//! - **Channel**: blocking receive built as a probe + sleep poll loop, so an
//!   idle rank burns no CPU while waiting
//! - **Coordinator**: deploys the pool, drains the backlog with worker
//!   affinity, collects the final reports, recalls everyone
//! - **Worker**: reactive loop around a single-method `Task` capability

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use channel::Channel;
pub use config::PoolConfig;
pub use coordinator::Coordinator;
pub use error::PoolError;
pub use protocol::{Envelope, Rank, Tag, COORDINATOR};
pub use transport::memory::MemoryCluster;
pub use transport::Transport;
pub use worker::{Task, Worker};

/// Result type used throughout pullpool
pub type Result<T> = anyhow::Result<T>;
