//! Pool protocol types and wire format
//!
//! Ranks, message tags, and the envelope a receive returns, plus the wire
//! representation used by the TCP transport. The wire format is MessagePack
//! (rmp-serde) with a 4-byte length prefix:
//!
//! ```text
//! [4 bytes: message length (little-endian u32)][N bytes: MessagePack message]
//! ```
//!
//! # Connection Flow
//!
//! ```text
//! Coordinator                     Worker
//!     |                              |
//!     |-- HELLO(rank, pool size) --->|
//!     |                              |
//!     |<----- JOINED(node id) -------|
//!     |                              |
//!     |-- FRAME(Work, item) -------->|
//!     |<- FRAME(Work, report) -------|
//!     |          ...                 |
//!     |-- FRAME(Recall, -) --------->|
//! ```
//!
//! Frames do not carry a source rank: each connection pairs exactly one
//! worker with the coordinator, so the receiving side stamps envelopes with
//! the rank it learned during the handshake.

use crate::error::PoolError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Increment when making breaking changes to the wire format. Coordinator
/// and workers must match; the handshake rejects anything else.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum accepted frame body (16 MB)
///
/// Payloads are opaque caller blobs; a length beyond this is a corrupt or
/// hostile length field, not a plausible work item.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Integer identity of a process within the fixed pool.
///
/// Rank 0 is always the coordinator; ranks 1..N are workers. Ranks are
/// assigned before the protocol starts and never change during a run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Rank(pub u32);

/// The coordinator's reserved rank.
pub const COORDINATOR: Rank = Rank(0);

impl Rank {
    pub fn is_coordinator(self) -> bool {
        self == COORDINATOR
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tag {
    /// Carries a work item (coordinator to worker) or a report back
    /// (worker to coordinator).
    Work,
    /// Tells the receiving worker to terminate. The payload is an ignored
    /// sentinel; the tag alone is the signal.
    Recall,
}

/// A received message together with its real sender and tag.
///
/// The source and tag matter when the receive used wildcard matching: the
/// coordinator's drain loop receives from any worker and needs to know who
/// reported in order to send that worker the next item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: Rank,
    pub tag: Tag,
    pub payload: Vec<u8>,
}

/// Handshake message (Coordinator -> Worker), first frame on a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank assigned to the receiving worker
    pub rank: Rank,

    /// Total pool size, coordinator included
    pub pool_size: usize,
}

/// Handshake reply (Worker -> Coordinator).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedMessage {
    /// Protocol version (must match)
    pub protocol_version: u32,

    /// Rank the worker accepted
    pub rank: Rank,

    /// Node identifier (hostname), for operator-facing output only
    pub node_id: String,
}

/// Everything that travels on a TCP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Wire {
    /// Handshake (Coordinator -> Worker)
    Hello(HelloMessage),

    /// Handshake reply (Worker -> Coordinator)
    Joined(JoinedMessage),

    /// Protocol traffic in either direction
    Frame { tag: Tag, payload: Vec<u8> },
}

/// Serialize a wire message with its length prefix.
pub fn encode_wire(msg: &Wire) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(msg).context("Failed to serialize wire message")?;

    let len = body.len() as u32;
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&len.to_le_bytes());
    framed.extend_from_slice(&body);

    Ok(framed)
}

/// Deserialize one wire message from a buffer.
///
/// Returns the message and the number of bytes consumed, length prefix
/// included.
pub fn decode_wire(buf: &[u8]) -> Result<(Wire, usize)> {
    if buf.len() < 4 {
        anyhow::bail!(
            "Buffer too small for message length (need 4 bytes, got {})",
            buf.len()
        );
    }

    let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", len, MAX_FRAME_BYTES);
    }
    if buf.len() < 4 + len {
        anyhow::bail!(
            "Incomplete message (need {} bytes, got {})",
            4 + len,
            buf.len()
        );
    }

    let msg = rmp_serde::from_slice(&buf[4..4 + len])
        .context("Failed to deserialize wire message")?;

    Ok((msg, 4 + len))
}

/// Read one complete wire message from a stream.
pub async fn read_wire<S>(stream: &mut S) -> Result<Wire>
where
    S: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    stream
        .read_exact(&mut len_buf)
        .await
        .context("Failed to read message length")?;

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_BYTES {
        anyhow::bail!("Message too large: {} bytes (max {})", len, MAX_FRAME_BYTES);
    }

    let mut body = vec![0u8; len];
    stream
        .read_exact(&mut body)
        .await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&body).context("Failed to deserialize wire message")?;

    Ok(msg)
}

/// Write one wire message to a stream and flush it.
pub async fn write_wire<S>(stream: &mut S, msg: &Wire) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let framed = encode_wire(msg)?;

    stream
        .write_all(&framed)
        .await
        .context("Failed to write message")?;
    stream.flush().await.context("Failed to flush stream")?;

    Ok(())
}

/// Check a peer's protocol version against ours.
pub fn check_version(peer: u32) -> Result<()> {
    if peer != PROTOCOL_VERSION {
        return Err(PoolError::VersionMismatch {
            local: PROTOCOL_VERSION,
            peer,
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_hello() {
        let msg = Wire::Hello(HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            rank: Rank(3),
            pool_size: 4,
        });

        let bytes = encode_wire(&msg).unwrap();
        let (decoded, consumed) = decode_wire(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        match decoded {
            Wire::Hello(hello) => {
                assert_eq!(hello.protocol_version, PROTOCOL_VERSION);
                assert_eq!(hello.rank, Rank(3));
                assert_eq!(hello.pool_size, 4);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_encode_decode_frame() {
        let msg = Wire::Frame {
            tag: Tag::Work,
            payload: vec![1, 2, 3],
        };

        let bytes = encode_wire(&msg).unwrap();
        let (decoded, consumed) = decode_wire(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        match decoded {
            Wire::Frame { tag, payload } => {
                assert_eq!(tag, Tag::Work);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_recall_payload_is_opaque() {
        // The recall sentinel payload survives the round trip but carries
        // no meaning; receivers only look at the tag.
        let msg = Wire::Frame {
            tag: Tag::Recall,
            payload: Vec::new(),
        };

        let bytes = encode_wire(&msg).unwrap();
        let (decoded, _) = decode_wire(&bytes).unwrap();

        match decoded {
            Wire::Frame { tag, payload } => {
                assert_eq!(tag, Tag::Recall);
                assert!(payload.is_empty());
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_message_framing() {
        let msg = Wire::Frame {
            tag: Tag::Recall,
            payload: Vec::new(),
        };
        let bytes = encode_wire(&msg).unwrap();

        assert!(bytes.len() >= 4);
        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        assert_eq!(bytes.len(), 4 + len);
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(u32::MAX).to_le_bytes());
        buf.extend_from_slice(&[0u8; 16]);

        assert!(decode_wire(&buf).is_err());
    }

    #[test]
    fn test_decode_incomplete_buffer() {
        let msg = Wire::Frame {
            tag: Tag::Work,
            payload: vec![0u8; 64],
        };
        let bytes = encode_wire(&msg).unwrap();

        assert!(decode_wire(&bytes[..bytes.len() - 1]).is_err());
        assert!(decode_wire(&bytes[..2]).is_err());
    }

    #[test]
    fn test_version_check() {
        assert!(check_version(PROTOCOL_VERSION).is_ok());

        let err = check_version(PROTOCOL_VERSION + 1).unwrap_err();
        match err.downcast_ref::<crate::error::PoolError>() {
            Some(crate::error::PoolError::VersionMismatch { local, peer }) => {
                assert_eq!(*local, PROTOCOL_VERSION);
                assert_eq!(*peer, PROTOCOL_VERSION + 1);
            }
            _ => panic!("Expected VersionMismatch"),
        }
    }
}
