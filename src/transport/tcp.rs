//! TCP transport
//!
//! Star topology: each worker process listens on a port, the coordinator
//! dials every worker address in order and assigns ranks 1..N through a
//! version-checked handshake. Nobody else is connected, which matches the
//! protocol: workers only ever talk to rank 0.
//!
//! Each connection runs a reader task that decodes incoming frames into the
//! local mailbox; `probe`/`consume` then work against the mailbox exactly as
//! they do in-process. `send` serializes onto the peer's write half. The
//! reader stamps every envelope with the rank learned at handshake time, so
//! a frame's origin is the connection, never self-declared.
//!
//! The pool is assumed reliable and already established; a dropped
//! connection simply stops its reader, and the next receive that depended
//! on that peer blocks (or times out, when a receive deadline is
//! configured).

use crate::error::PoolError;
use crate::protocol::{
    check_version, read_wire, write_wire, Envelope, HelloMessage, JoinedMessage, Rank, Tag,
    Wire, COORDINATOR, PROTOCOL_VERSION,
};
use crate::transport::{Mailbox, Transport};
use crate::Result;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

/// One rank's endpoint of a TCP pool.
pub struct TcpTransport {
    rank: Rank,
    size: usize,
    mailbox: Arc<Mailbox>,
    peers: HashMap<Rank, tokio::sync::Mutex<OwnedWriteHalf>>,
}

impl TcpTransport {
    /// Coordinator endpoint: dial every worker address, assigning ranks in
    /// list order (first address becomes rank 1).
    pub async fn connect_pool(addresses: &[String]) -> Result<Self> {
        let size = addresses.len() + 1;
        let mailbox = Arc::new(Mailbox::new());
        let mut peers = HashMap::new();

        for (i, addr) in addresses.iter().enumerate() {
            let rank = Rank(i as u32 + 1);
            let mut stream = TcpStream::connect(addr)
                .await
                .with_context(|| format!("Failed to connect to {}", addr))?;

            write_wire(
                &mut stream,
                &Wire::Hello(HelloMessage {
                    protocol_version: PROTOCOL_VERSION,
                    rank,
                    pool_size: size,
                }),
            )
            .await
            .with_context(|| format!("Failed to send HELLO to {}", addr))?;

            let reply = read_wire(&mut stream)
                .await
                .with_context(|| format!("Failed to read JOINED from {}", addr))?;
            match reply {
                Wire::Joined(joined) => {
                    check_version(joined.protocol_version)
                        .with_context(|| format!("Handshake with {} failed", addr))?;
                    println!("Worker {} joined from {} ({})", rank, addr, joined.node_id);
                }
                other => {
                    anyhow::bail!("Expected JOINED from {}, got {:?}", addr, other)
                }
            }

            let (read_half, write_half) = stream.into_split();
            spawn_reader(rank, read_half, Arc::clone(&mailbox));
            peers.insert(rank, tokio::sync::Mutex::new(write_half));
        }

        Ok(Self {
            rank: COORDINATOR,
            size,
            mailbox,
            peers,
        })
    }

    /// Worker endpoint: accept the coordinator's connection and take the
    /// rank it assigns.
    ///
    /// `node_id` travels in the JOINED reply so the coordinator can name
    /// this process in its output; it has no protocol meaning.
    pub async fn accept_pool(listener: TcpListener, node_id: &str) -> Result<Self> {
        let (mut stream, addr) = listener
            .accept()
            .await
            .context("Failed to accept coordinator connection")?;

        let hello = match read_wire(&mut stream)
            .await
            .with_context(|| format!("Failed to read HELLO from {}", addr))?
        {
            Wire::Hello(hello) => hello,
            other => anyhow::bail!("Expected HELLO from {}, got {:?}", addr, other),
        };
        check_version(hello.protocol_version)
            .with_context(|| format!("Handshake with {} failed", addr))?;

        write_wire(
            &mut stream,
            &Wire::Joined(JoinedMessage {
                protocol_version: PROTOCOL_VERSION,
                rank: hello.rank,
                node_id: node_id.to_string(),
            }),
        )
        .await
        .context("Failed to send JOINED")?;

        let mailbox = Arc::new(Mailbox::new());
        let (read_half, write_half) = stream.into_split();
        spawn_reader(COORDINATOR, read_half, Arc::clone(&mailbox));

        let mut peers = HashMap::new();
        peers.insert(COORDINATOR, tokio::sync::Mutex::new(write_half));

        Ok(Self {
            rank: hello.rank,
            size: hello.pool_size,
            mailbox,
            peers,
        })
    }
}

/// Decode frames from one peer into the local mailbox until the connection
/// closes.
fn spawn_reader(peer: Rank, mut read_half: OwnedReadHalf, mailbox: Arc<Mailbox>) {
    tokio::spawn(async move {
        loop {
            match read_wire(&mut read_half).await {
                Ok(Wire::Frame { tag, payload }) => {
                    mailbox.push(Envelope {
                        source: peer,
                        tag,
                        payload,
                    });
                }
                Ok(other) => {
                    eprintln!(
                        "Unexpected handshake message from rank {} after join: {:?}",
                        peer, other
                    );
                    break;
                }
                // Connection closed; normal after a recall.
                Err(_) => break,
            }
        }
    });
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<()> {
        let writer = match self.peers.get(&dest) {
            Some(writer) => writer,
            None if !self.rank.is_coordinator() && dest != COORDINATOR => {
                return Err(PoolError::NotCoordinator(dest).into())
            }
            None => {
                return Err(PoolError::RankOutOfRange {
                    rank: dest,
                    size: self.size,
                }
                .into())
            }
        };

        let mut writer = writer.lock().await;
        write_wire(&mut *writer, &Wire::Frame { tag, payload })
            .await
            .with_context(|| format!("Failed to send to rank {}", dest))
    }

    fn probe(&self, source: Option<Rank>, tag: Option<Tag>) -> Option<(Rank, Tag)> {
        self.mailbox.probe(source, tag)
    }

    fn consume(&self, source: Rank, tag: Tag) -> Result<Envelope> {
        self.mailbox.take(source, tag).ok_or_else(|| {
            anyhow::anyhow!("No queued message from rank {} with tag {:?}", source, tag)
        })
    }
}
