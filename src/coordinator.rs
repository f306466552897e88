//! Coordinator side of the pool protocol
//!
//! The coordinator owns the backlog of work items and drives the whole run:
//!
//! 1. **Deploy**: every worker gets one item; workers the backlog cannot
//!    cover are recalled on the spot.
//! 2. **Drain**: while items remain, wait for any report and hand the next
//!    item to whichever worker just reported. Fast workers therefore pull
//!    proportionally more work; that affinity is the load balancing.
//! 3. **Final collection**: one last report from each worker still out.
//! 4. **Recall**: tell the remaining workers to terminate.
//!
//! Between deploy and recall every active worker has exactly one item
//! outstanding, and each backlog item is dispatched exactly once.

use crate::channel::Channel;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::protocol::{Rank, Tag};
use crate::Result;
use anyhow::Context;
use std::time::Duration;

/// Pool coordinator (rank 0).
///
/// Holds the backlog, the set of deployed workers, and the collected
/// reports for one orchestration run.
pub struct Coordinator {
    channel: Channel,

    /// Not-yet-dispatched work items. Dispatch pops from the tail, so the
    /// last-submitted item goes out first; see `orchestrate`.
    backlog: Vec<Vec<u8>>,

    /// Worker ranks currently deployed (sent work, not yet recalled).
    active: Vec<Rank>,

    retain_reports: bool,
    receive_timeout: Option<Duration>,

    /// Reports in arrival order, which depends on which worker finished
    /// first, not on submission order.
    reports: Vec<Vec<u8>>,
}

impl Coordinator {
    /// Create a coordinator for one run over `backlog`.
    ///
    /// The channel must belong to rank 0.
    pub fn new(channel: Channel, backlog: Vec<Vec<u8>>, config: &PoolConfig) -> Result<Self> {
        anyhow::ensure!(
            channel.rank().is_coordinator(),
            "Coordinator requires the rank-0 channel, got rank {}",
            channel.rank()
        );

        Ok(Self {
            channel,
            backlog,
            active: Vec::new(),
            retain_reports: config.retain_reports,
            receive_timeout: config.receive_timeout(),
            reports: Vec::new(),
        })
    }

    /// All worker ranks in the pool.
    fn worker_ranks(&self) -> Vec<Rank> {
        (1..self.channel.size() as u32).map(Rank).collect()
    }

    /// Run the protocol to completion: deploy, drain, collect, recall.
    ///
    /// Dispatch order is last-submitted-first: items are popped from the
    /// backlog's tail. This reverses submission order but has no effect on
    /// correctness, only on which items go out early.
    ///
    /// Fails fast with [`PoolError::NoWorkers`] when the pool has no worker
    /// ranks and there is work to do; with an empty backlog a worker-less
    /// run is a no-op.
    pub async fn orchestrate(&mut self) -> Result<()> {
        let workers = self.worker_ranks();
        if workers.is_empty() {
            if self.backlog.is_empty() {
                return Ok(());
            }
            return Err(PoolError::NoWorkers.into());
        }

        // Deploy: one item per worker, recalling whoever the backlog
        // cannot cover.
        self.active = workers.clone();
        self.reports.clear();
        for worker in workers {
            if let Some(item) = self.backlog.pop() {
                self.channel
                    .send(worker, Tag::Work, item)
                    .await
                    .with_context(|| format!("Failed to dispatch to worker {}", worker))?;
            } else {
                self.recall(worker).await?;
            }
        }

        // Drain: every report frees its worker for the next item.
        while !self.backlog.is_empty() {
            let (report, worker) = self.await_report().await?;
            if self.retain_reports {
                self.reports.push(report);
            }

            if let Some(item) = self.backlog.pop() {
                self.channel
                    .send(worker, Tag::Work, item)
                    .await
                    .with_context(|| format!("Failed to dispatch to worker {}", worker))?;
            }
        }

        // Final collection: each active worker still has exactly one item
        // outstanding.
        for _ in 0..self.active.len() {
            let (report, _worker) = self.await_report().await?;
            if self.retain_reports {
                self.reports.push(report);
            }
        }

        // Recall whoever is still out.
        for worker in self.active.clone() {
            self.recall(worker).await?;
        }

        Ok(())
    }

    /// Wait for a report from any worker, with any tag.
    async fn await_report(&self) -> Result<(Vec<u8>, Rank)> {
        let env = self
            .channel
            .recv_bounded(None, None, self.receive_timeout)
            .await
            .context("Failed while waiting for a worker report")?;
        Ok((env.payload, env.source))
    }

    /// Send a worker its recall and drop it from the active set.
    async fn recall(&mut self, worker: Rank) -> Result<()> {
        self.channel
            .send(worker, Tag::Recall, Vec::new())
            .await
            .with_context(|| format!("Failed to recall worker {}", worker))?;
        self.active.retain(|&r| r != worker);
        Ok(())
    }

    /// Collected reports, in arrival order.
    ///
    /// Fails with [`PoolError::ReportsNotRetained`] when the run was
    /// configured not to keep them.
    pub fn reports(&self) -> Result<&[Vec<u8>]> {
        if !self.retain_reports {
            return Err(PoolError::ReportsNotRetained.into());
        }
        Ok(&self.reports)
    }

    /// Worker ranks still deployed. Empty before a run and after a
    /// completed one.
    pub fn active_workers(&self) -> &[Rank] {
        &self.active
    }

    /// Work items not yet dispatched.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryCluster;
    use std::sync::Arc;

    const POLL: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn test_requires_rank_zero() {
        let mut pool = MemoryCluster::new(2);
        let worker_channel = Channel::new(Arc::new(pool.remove(1)), POLL);

        assert!(Coordinator::new(worker_channel, Vec::new(), &PoolConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_zero_workers_empty_backlog_is_noop() {
        let mut pool = MemoryCluster::new(1);
        let channel = Channel::new(Arc::new(pool.remove(0)), POLL);

        let mut coordinator =
            Coordinator::new(channel, Vec::new(), &PoolConfig::default()).unwrap();
        coordinator.orchestrate().await.unwrap();
        assert!(coordinator.active_workers().is_empty());
        assert!(coordinator.reports().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_workers_with_backlog_fails_fast() {
        let mut pool = MemoryCluster::new(1);
        let channel = Channel::new(Arc::new(pool.remove(0)), POLL);

        let mut coordinator =
            Coordinator::new(channel, vec![vec![1]], &PoolConfig::default()).unwrap();
        let err = coordinator.orchestrate().await.unwrap_err();

        match err.downcast_ref::<PoolError>() {
            Some(PoolError::NoWorkers) => {}
            _ => panic!("Expected NoWorkers"),
        }
    }

    #[tokio::test]
    async fn test_reports_precondition_error_when_disabled() {
        let mut pool = MemoryCluster::new(1);
        let channel = Channel::new(Arc::new(pool.remove(0)), POLL);

        let config = PoolConfig {
            retain_reports: false,
            ..PoolConfig::default()
        };
        let coordinator = Coordinator::new(channel, Vec::new(), &config).unwrap();

        let err = coordinator.reports().unwrap_err();
        match err.downcast_ref::<PoolError>() {
            Some(PoolError::ReportsNotRetained) => {}
            _ => panic!("Expected ReportsNotRetained"),
        }
    }
}
