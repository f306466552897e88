//! Blocking receive without busy-waiting
//!
//! The channel is a thin layer over a [`Transport`] that turns the
//! non-blocking probe into a blocking receive: probe, and while nothing
//! matches, sleep for the poll interval before probing again. The native
//! alternative (spinning on probe) would pin a CPU for every idle worker;
//! sleeping trades wake-up latency, bounded by the poll interval, for
//! near-zero idle cost. That trade-off is the point, so the interval is
//! configuration, never a constant.

use crate::protocol::{Envelope, Rank, Tag};
use crate::transport::Transport;
use crate::{PoolError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Send / probe / receive over a fixed pool of ranks.
///
/// Cloning is cheap; clones share the underlying transport.
#[derive(Clone)]
pub struct Channel {
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
}

impl Channel {
    /// Wrap a transport with the given receive poll interval.
    pub fn new(transport: Arc<dyn Transport>, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
        }
    }

    /// This process's rank.
    pub fn rank(&self) -> Rank {
        self.transport.rank()
    }

    /// Total pool size, coordinator included.
    pub fn size(&self) -> usize {
        self.transport.size()
    }

    /// Send a tagged payload to `dest`. Fire-and-forget: returns once the
    /// transport has accepted the message, with no acknowledgement.
    pub async fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        self.transport.send(dest, tag, payload).await
    }

    /// Non-blocking check for a matching message. `None` selectors match
    /// any source or any tag.
    pub fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Option<(Rank, Tag)> {
        self.transport.probe(source, tag)
    }

    /// Blocking receive.
    ///
    /// Polls the transport and sleeps for the poll interval between misses;
    /// on a hit, consumes the matched message and returns it with its real
    /// source and tag (relevant under wildcard matching). Blocks forever if
    /// no matching message ever arrives.
    pub async fn recv(&self, source: Option<Rank>, tag: Option<Tag>) -> Result<Envelope> {
        loop {
            if let Some((src, tg)) = self.transport.probe(source, tag) {
                return self.transport.consume(src, tg);
            }
            sleep(self.poll_interval).await;
        }
    }

    /// Deadline-bounded variant of [`recv`](Self::recv).
    ///
    /// Fails with [`PoolError::ReceiveTimeout`] instead of blocking forever,
    /// for pools that would rather surface a crashed peer than deadlock.
    pub async fn recv_timeout(
        &self,
        source: Option<Rank>,
        tag: Option<Tag>,
        timeout: Duration,
    ) -> Result<Envelope> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some((src, tg)) = self.transport.probe(source, tag) {
                return self.transport.consume(src, tg);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::ReceiveTimeout(timeout).into());
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Receive with an optional deadline: `None` blocks forever, preserving
    /// the protocol's default semantics.
    pub async fn recv_bounded(
        &self,
        source: Option<Rank>,
        tag: Option<Tag>,
        timeout: Option<Duration>,
    ) -> Result<Envelope> {
        match timeout {
            Some(t) => self.recv_timeout(source, tag, t).await,
            None => self.recv(source, tag).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryCluster;

    const POLL: Duration = Duration::from_millis(1);

    fn pair() -> (Channel, Channel) {
        let mut pool = MemoryCluster::new(2);
        let worker = Channel::new(Arc::new(pool.remove(1)), POLL);
        let coordinator = Channel::new(Arc::new(pool.remove(0)), POLL);
        (coordinator, worker)
    }

    #[tokio::test]
    async fn test_recv_returns_queued_message() {
        let (coordinator, worker) = pair();

        coordinator
            .send(Rank(1), Tag::Work, vec![7])
            .await
            .unwrap();

        let env = worker.recv(None, None).await.unwrap();
        assert_eq!(env.source, Rank(0));
        assert_eq!(env.tag, Tag::Work);
        assert_eq!(env.payload, vec![7]);
    }

    #[tokio::test]
    async fn test_recv_polls_until_arrival() {
        let (coordinator, worker) = pair();

        let receiver = tokio::spawn(async move { worker.recv(Some(Rank(0)), None).await });

        // Let the receiver go through at least one empty probe first.
        sleep(Duration::from_millis(5)).await;
        coordinator
            .send(Rank(1), Tag::Recall, Vec::new())
            .await
            .unwrap();

        let env = receiver.await.unwrap().unwrap();
        assert_eq!(env.tag, Tag::Recall);
    }

    #[tokio::test]
    async fn test_recv_wildcard_reports_real_source_and_tag() {
        let mut pool = MemoryCluster::new(3);
        let coordinator = Channel::new(Arc::new(pool.remove(0)), POLL);
        let worker = Channel::new(Arc::new(pool.remove(1)), POLL);

        worker.send(Rank(0), Tag::Work, vec![9]).await.unwrap();

        let env = coordinator.recv(None, None).await.unwrap();
        assert_eq!(env.source, Rank(2));
        assert_eq!(env.tag, Tag::Work);
    }

    #[tokio::test]
    async fn test_recv_timeout_elapses() {
        let (_coordinator, worker) = pair();

        let err = worker
            .recv_timeout(None, None, Duration::from_millis(10))
            .await
            .unwrap_err();

        match err.downcast_ref::<PoolError>() {
            Some(PoolError::ReceiveTimeout(t)) => {
                assert_eq!(*t, Duration::from_millis(10))
            }
            _ => panic!("Expected ReceiveTimeout"),
        }
    }

    #[tokio::test]
    async fn test_recv_bounded_none_blocks_and_some_bounds() {
        let (coordinator, worker) = pair();

        coordinator
            .send(Rank(1), Tag::Work, vec![1])
            .await
            .unwrap();
        let env = worker
            .recv_bounded(None, None, Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(env.payload, vec![1]);

        // An unbounded receive with a queued message never needs to sleep.
        coordinator
            .send(Rank(1), Tag::Work, vec![2])
            .await
            .unwrap();
        let env = worker.recv_bounded(None, None, None).await.unwrap();
        assert_eq!(env.payload, vec![2]);
    }
}
