//! In-process transport
//!
//! A pool of ranks living inside one process and sharing a mailbox array.
//! Delivery is a direct push into the destination's mailbox, so everything
//! the protocol assumes of a real transport holds trivially: reliable
//! delivery and FIFO per directed pair. Used by tests and by the
//! single-process demo mode.

use crate::error::PoolError;
use crate::protocol::{Envelope, Rank, Tag};
use crate::transport::{Mailbox, Transport};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Builder for an in-process pool.
pub struct MemoryCluster;

impl MemoryCluster {
    /// Create `size` connected endpoints, one per rank.
    ///
    /// Endpoint `i` has rank `i`; index 0 is the coordinator's. `size`
    /// counts the coordinator, so a pool with three workers is `new(4)`.
    pub fn new(size: usize) -> Vec<MemoryTransport> {
        let mailboxes: Arc<Vec<Mailbox>> =
            Arc::new((0..size).map(|_| Mailbox::new()).collect());

        (0..size)
            .map(|rank| MemoryTransport {
                rank: Rank(rank as u32),
                mailboxes: Arc::clone(&mailboxes),
            })
            .collect()
    }
}

/// One rank's endpoint of an in-process pool.
pub struct MemoryTransport {
    rank: Rank,
    mailboxes: Arc<Vec<Mailbox>>,
}

#[async_trait]
impl Transport for MemoryTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.mailboxes.len()
    }

    async fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let mailbox = self
            .mailboxes
            .get(dest.0 as usize)
            .ok_or(PoolError::RankOutOfRange {
                rank: dest,
                size: self.mailboxes.len(),
            })?;

        mailbox.push(Envelope {
            source: self.rank,
            tag,
            payload,
        });
        Ok(())
    }

    fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Option<(Rank, Tag)> {
        self.mailboxes[self.rank.0 as usize].probe(source, tag)
    }

    fn consume(&self, source: Rank, tag: Tag) -> Result<Envelope> {
        self.mailboxes[self.rank.0 as usize]
            .take(source, tag)
            .ok_or_else(|| {
                anyhow::anyhow!("No queued message from rank {} with tag {:?}", source, tag)
            })
    }
}
