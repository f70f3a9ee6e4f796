//! Error types for buffers and the transport seam.
//!
//! Organized by subsystem the way the rest of the workspace is: buffer
//! errors here, transport errors here, protocol and configuration
//! errors in `halo-comm` where the state machines live.

use std::error::Error;
use std::fmt;

use crate::id::Rank;

/// Errors from reading a [`RecvBuffer`](crate::RecvBuffer).
///
/// Writing is unconditionally safe (the buffer grows); only reads past
/// the written length fail. An underflow is a protocol error at the
/// layer above: the unpack callback disagreed with the packer about the
/// message layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// A read requested more bytes than remain behind the cursor.
    Underflow {
        /// Bytes the read asked for.
        requested: usize,
        /// Bytes remaining in the buffer.
        remaining: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Underflow {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "buffer underflow: requested {requested} bytes, {remaining} remaining"
                )
            }
        }
    }
}

impl Error for BufferError {}

/// Errors surfaced by a [`Transport`](crate::Transport) implementation.
///
/// The subsystem trusts the substrate's delivery guarantees: these are
/// unrecoverable wiring failures, not retryable conditions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportError {
    /// The peer endpoint is gone (its mailbox closed mid-operation).
    Disconnected {
        /// The unreachable peer.
        peer: Rank,
    },
    /// A rank outside the communicator was addressed.
    UnknownPeer {
        /// The out-of-range rank.
        rank: Rank,
    },
    /// An arrived message exceeds the byte count the receive was posted
    /// with. Indicates a sender/receiver size disagreement.
    MessageTooLarge {
        /// Rank the message came from.
        source: Rank,
        /// Maximum byte count the receive was posted with.
        posted: usize,
        /// Actual byte count of the arrived message.
        received: usize,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer } => write!(f, "peer rank {peer} disconnected"),
            Self::UnknownPeer { rank } => write!(f, "rank {rank} is not part of the communicator"),
            Self::MessageTooLarge {
                source,
                posted,
                received,
            } => {
                write!(
                    f,
                    "message from rank {source} is {received} bytes, receive was posted for {posted}"
                )
            }
        }
    }
}

impl Error for TransportError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn underflow_display_names_both_counts() {
        let e = BufferError::Underflow {
            requested: 8,
            remaining: 3,
        };
        let msg = format!("{e}");
        assert!(msg.contains('8'));
        assert!(msg.contains('3'));
    }

    #[test]
    fn transport_error_display_names_rank() {
        let e = TransportError::MessageTooLarge {
            source: Rank(4),
            posted: 16,
            received: 32,
        };
        let msg = format!("{e}");
        assert!(msg.contains("rank 4"));
        assert!(msg.contains("32"));
    }
}
