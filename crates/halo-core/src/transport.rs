//! The seam between the communication subsystem and the message-passing
//! substrate.
//!
//! [`Transport`] models the four substrate capabilities the subsystem
//! drives: non-blocking send, non-blocking receive, wait-any over a set
//! of outstanding receives, and wait-all over outstanding sends. The
//! trait transfers buffer ownership at the boundary — payloads move
//! into the transport on post, received bytes move out of it on
//! completion — so an in-flight buffer can never be aliased or mutated
//! by the caller.
//!
//! Implementations are expected to match messages the way rank-based
//! substrates do: a posted receive completes with the earliest arrived
//! message from its `(source, tag)` pair, in posting order.

use crate::error::TransportError;
use crate::id::{Rank, Tag};

/// Opaque handle to an outstanding non-blocking send.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SendHandle(pub u64);

/// Opaque handle to an outstanding non-blocking receive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecvHandle(pub u64);

/// A rank-addressed, tag-namespaced, non-blocking message substrate.
///
/// Methods take `&self`: an implementation must be safe to share across
/// threads, but the subsystem additionally serializes every call to a
/// given instance behind one lock during thread-overlapped cycles, so
/// implementations are free to use internal locking without contention
/// concerns.
pub trait Transport: Send + Sync {
    /// The rank of this endpoint within its communicator.
    fn rank(&self) -> Rank;

    /// Post a non-blocking send of `payload` to `dest` on `tag`.
    ///
    /// The payload is owned by the transport until the returned handle
    /// is passed to [`wait_sends`](Self::wait_sends).
    fn post_send(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<SendHandle, TransportError>;

    /// Post a non-blocking receive from `source` on `tag`.
    ///
    /// The completing message must be at most `max_bytes` long;
    /// a longer arrival fails the matching wait with
    /// [`TransportError::MessageTooLarge`].
    fn post_recv(&self, source: Rank, tag: Tag, max_bytes: usize) -> Result<RecvHandle, TransportError>;

    /// Block until one of `pending` completes; return its index within
    /// `pending` and the received bytes.
    ///
    /// Every handle in `pending` must have been returned by
    /// [`post_recv`](Self::post_recv) on this instance and not yet
    /// completed. `pending` must be non-empty.
    fn wait_any(&self, pending: &[RecvHandle]) -> Result<(usize, Vec<u8>), TransportError>;

    /// Block until every send in `pending` has completed.
    ///
    /// A no-op for an empty set.
    fn wait_sends(&self, pending: &[SendHandle]) -> Result<(), TransportError>;
}
