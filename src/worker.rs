//! Worker side of the pool protocol
//!
//! A worker is purely reactive: block for an instruction from the
//! coordinator, execute the supplied task on a `Work` payload and report
//! the result back, or terminate on `Recall`. It never self-terminates,
//! never re-queues work, and never addresses any rank but 0.

use crate::channel::Channel;
use crate::config::PoolConfig;
use crate::protocol::{Tag, COORDINATOR};
use crate::Result;
use anyhow::Context;
use std::time::Duration;

/// The unit of work a worker knows how to execute.
///
/// Invoked synchronously, once per dispatched item, on the worker process
/// that received it. Payloads are opaque blobs; encoding is between the
/// task and whoever built the backlog. A failure is fatal to the worker:
/// it terminates without reporting, so pools that need to survive that
/// should configure a receive timeout on the coordinator.
pub trait Task: Send + Sync {
    fn execute(&self, item: &[u8]) -> Result<Vec<u8>>;
}

impl<F> Task for F
where
    F: Fn(&[u8]) -> Result<Vec<u8>> + Send + Sync,
{
    fn execute(&self, item: &[u8]) -> Result<Vec<u8>> {
        self(item)
    }
}

/// Pool worker (any rank but 0).
pub struct Worker<T> {
    channel: Channel,
    task: T,
    receive_timeout: Option<Duration>,
}

impl<T: Task> Worker<T> {
    /// Create a worker around a channel and a task.
    ///
    /// The channel must not belong to rank 0.
    pub fn new(channel: Channel, task: T, config: &PoolConfig) -> Result<Self> {
        anyhow::ensure!(
            !channel.rank().is_coordinator(),
            "Worker cannot run on the coordinator rank"
        );

        Ok(Self {
            channel,
            task,
            receive_timeout: config.receive_timeout(),
        })
    }

    /// Serve orders until recalled.
    ///
    /// Loop: await an instruction from the coordinator (any tag); on
    /// `Recall`, return without sending or receiving anything further; on
    /// `Work`, execute the task and report the result. A task failure
    /// propagates out of this loop; nothing is reported for the failed
    /// item.
    pub async fn go(&mut self) -> Result<()> {
        loop {
            let order = self
                .channel
                .recv_bounded(Some(COORDINATOR), None, self.receive_timeout)
                .await
                .context("Failed while waiting for an order")?;

            match order.tag {
                Tag::Recall => return Ok(()),
                Tag::Work => {
                    let report = self.task.execute(&order.payload)?;
                    self.channel
                        .send(COORDINATOR, Tag::Work, report)
                        .await
                        .context("Failed to report to the coordinator")?;
                }
            }
        }
    }

    /// This worker's rank.
    pub fn rank(&self) -> crate::protocol::Rank {
        self.channel.rank()
    }
}
