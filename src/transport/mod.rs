//! Rank-addressed message transports
//!
//! A transport is the pool's only shared facility: a fixed group of ranks
//! that can send each other tagged payloads. Everything above it (channel,
//! coordinator, worker) is written against the [`Transport`] trait, so the
//! same protocol runs over TCP between OS processes or entirely in-memory
//! inside tests and the single-process demo mode.
//!
//! A transport is constructed explicitly and handed to `Channel::new`.
//! There is deliberately no process-global default instance.
//!
//! # Modules
//!
//! - `memory`: in-process pool sharing one mailbox array
//! - `tcp`: star topology, workers listening and the coordinator dialing out

pub mod memory;
pub mod tcp;

use crate::protocol::{Envelope, Rank, Tag};
use crate::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Point-to-point messaging over a fixed, statically-ranked pool.
///
/// `probe` and `consume` are split the way the channel needs them: `probe`
/// answers "is a matching message queued?" without touching it and reports
/// the real source and tag of the match; `consume` then removes exactly that
/// message. `consume` is only called for a (source, tag) pair that `probe`
/// just confirmed, and only ever by the rank that owns the inbox, so the
/// pair cannot race.
#[async_trait]
pub trait Transport: Send + Sync {
    /// This process's rank within the pool.
    fn rank(&self) -> Rank;

    /// Total number of ranks in the pool, coordinator included.
    fn size(&self) -> usize;

    /// Hand a message to the transport.
    ///
    /// Returns once the message is accepted for delivery; there is no
    /// acknowledgement from the receiving rank. Transport failures are
    /// fatal to the caller, never retried here.
    async fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()>;

    /// Non-blocking availability check.
    ///
    /// `None` selectors are wildcards matching any source or any tag.
    /// Returns the matched message's real source and tag without consuming
    /// it, or `None` when nothing matches.
    fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Option<(Rank, Tag)>;

    /// Remove and return the first queued message from `source` with `tag`.
    fn consume(&self, source: Rank, tag: Tag) -> Result<Envelope>;
}

/// Per-rank inbox of undelivered envelopes.
///
/// Readers append in arrival order and `take` removes the first exact
/// match, so messages from a single sender are observed in send order
/// (FIFO per directed pair). No ordering holds across different senders;
/// wildcard receives see whatever arrived first.
#[derive(Debug, Default)]
pub struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received envelope.
    pub fn push(&self, env: Envelope) {
        self.queue.lock().unwrap().push_back(env);
    }

    /// First queued envelope matching the selectors, without removal.
    pub fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Option<(Rank, Tag)> {
        self.queue
            .lock()
            .unwrap()
            .iter()
            .find(|env| matches(env, source, tag))
            .map(|env| (env.source, env.tag))
    }

    /// Remove and return the first envelope from `source` with `tag`.
    pub fn take(&self, source: Rank, tag: Tag) -> Option<Envelope> {
        let mut queue = self.queue.lock().unwrap();
        let pos = queue
            .iter()
            .position(|env| matches(env, Some(source), Some(tag)))?;
        queue.remove(pos)
    }
}

fn matches(env: &Envelope, source: Option<Rank>, tag: Option<Tag>) -> bool {
    source.map_or(true, |s| env.source == s) && tag.map_or(true, |t| env.tag == t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(source: u32, tag: Tag, byte: u8) -> Envelope {
        Envelope {
            source: Rank(source),
            tag,
            payload: vec![byte],
        }
    }

    #[test]
    fn test_mailbox_fifo_per_sender() {
        let mailbox = Mailbox::new();
        mailbox.push(env(1, Tag::Work, 10));
        mailbox.push(env(1, Tag::Work, 11));

        assert_eq!(mailbox.take(Rank(1), Tag::Work).unwrap().payload, vec![10]);
        assert_eq!(mailbox.take(Rank(1), Tag::Work).unwrap().payload, vec![11]);
        assert!(mailbox.take(Rank(1), Tag::Work).is_none());
    }

    #[test]
    fn test_mailbox_probe_does_not_consume() {
        let mailbox = Mailbox::new();
        mailbox.push(env(2, Tag::Recall, 0));

        assert_eq!(mailbox.probe(None, None), Some((Rank(2), Tag::Recall)));
        assert_eq!(mailbox.probe(None, None), Some((Rank(2), Tag::Recall)));
        assert!(mailbox.take(Rank(2), Tag::Recall).is_some());
        assert_eq!(mailbox.probe(None, None), None);
    }

    #[test]
    fn test_mailbox_wildcard_and_exact_selectors() {
        let mailbox = Mailbox::new();
        mailbox.push(env(1, Tag::Work, 1));
        mailbox.push(env(2, Tag::Recall, 2));

        // Exact source skips the non-matching head.
        assert_eq!(mailbox.probe(Some(Rank(2)), None), Some((Rank(2), Tag::Recall)));
        // Exact tag likewise.
        assert_eq!(mailbox.probe(None, Some(Tag::Recall)), Some((Rank(2), Tag::Recall)));
        // Full wildcard reports the arrival-order head.
        assert_eq!(mailbox.probe(None, None), Some((Rank(1), Tag::Work)));
        // No match at all.
        assert_eq!(mailbox.probe(Some(Rank(3)), None), None);
    }
}
