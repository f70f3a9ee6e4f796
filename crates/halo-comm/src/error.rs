//! Error taxonomy for the communication state machines.
//!
//! Everything here is unrecoverable at this layer and surfaced to the
//! caller as a hard failure: the subsystem trusts its substrate's
//! delivery guarantees and spends its correctness effort on the cycle
//! state machine and buffer lifetime discipline, not on masking
//! transport faults.

use std::error::Error;
use std::fmt;

use halo_core::{BufferError, Rank, TransportError};

/// Errors from [`BufferSystem`](crate::BufferSystem) and
/// [`CallbackBufferSystem`](crate::CallbackBufferSystem).
///
/// Protocol errors indicate a cycle driven out of order or a
/// sender/receiver disagreement; configuration errors indicate a
/// partner registration without a matching callback. Both terminate
/// the simulation step that triggered them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// `schedule_receives` was called before the previous cycle's
    /// completion loop observed the end of the completion stream.
    ReceivesAlreadyScheduled,
    /// `send` was called twice for the same rank within one cycle.
    SendInFlight {
        /// The doubly-sent rank.
        rank: Rank,
    },
    /// A receive completed for a rank absent from the partner table.
    /// Indicates a sender/receiver mismatch; not locally recoverable.
    UnregisteredRank {
        /// The unexpected rank.
        rank: Rank,
    },
    /// A message's byte count disagrees with the expected size.
    SizeMismatch {
        /// The offending partner.
        rank: Rank,
        /// Bytes the receive was scheduled for.
        expected: usize,
        /// Bytes actually received.
        got: usize,
    },
    /// A phase-1 size message of the two-phase handshake had the wrong
    /// length.
    SizeHeaderCorrupt {
        /// The offending partner.
        rank: Rank,
        /// Length of the malformed header message.
        len: usize,
    },
    /// A known-size receive was scheduled without a valid size.
    ReceiveSizeUnknown {
        /// The partner whose size is missing.
        rank: Rank,
    },
    /// A second local-mode send was issued while one is outstanding.
    /// The no-transport mode holds exactly one send/receive pair.
    LocalSendPending {
        /// Destination of the rejected send.
        rank: Rank,
    },
    /// A send-registered rank has no pack callback.
    MissingPackCallback {
        /// The unconfigured rank.
        rank: Rank,
    },
    /// A completed receive has no unpack callback to consume it.
    MissingUnpackCallback {
        /// The unconfigured rank.
        rank: Rank,
    },
    /// An unpack callback read past the end of its message.
    Buffer(BufferError),
    /// The transport substrate failed.
    Transport(TransportError),
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReceivesAlreadyScheduled => {
                write!(f, "receives scheduled while the previous cycle is still open")
            }
            Self::SendInFlight { rank } => {
                write!(f, "send to rank {rank} already posted this cycle")
            }
            Self::UnregisteredRank { rank } => {
                write!(f, "receive completed for unregistered rank {rank}")
            }
            Self::SizeMismatch {
                rank,
                expected,
                got,
            } => {
                write!(
                    f,
                    "message from rank {rank}: expected {expected} bytes, got {got}"
                )
            }
            Self::SizeHeaderCorrupt { rank, len } => {
                write!(
                    f,
                    "size header from rank {rank} has {len} bytes instead of 8"
                )
            }
            Self::ReceiveSizeUnknown { rank } => {
                write!(f, "known-size receive from rank {rank} scheduled without a size")
            }
            Self::LocalSendPending { rank } => {
                write!(f, "local send to rank {rank} while another is outstanding")
            }
            Self::MissingPackCallback { rank } => {
                write!(f, "no pack callback registered for send rank {rank}")
            }
            Self::MissingUnpackCallback { rank } => {
                write!(f, "no unpack callback registered for receive rank {rank}")
            }
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl Error for CommError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for CommError {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<TransportError> for CommError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
