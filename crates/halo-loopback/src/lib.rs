//! In-process loopback implementation of the [`Transport`] trait.
//!
//! [`loopback_fabric`] wires `n` endpoints all-to-all through shared
//! mailboxes, one per endpoint. Message matching follows rank-based
//! substrate rules: a posted receive completes with the earliest
//! arrived message from its `(source, tag)` pair, and receives posted
//! for the same pair match in posting order.
//!
//! Delivery happens at post time: a send locks the destination mailbox,
//! appends the envelope, and wakes every thread waiting on that
//! mailbox, so [`Transport::wait_sends`] never blocks. This is the
//! strongest progress model the contract allows and exercises the same
//! caller-side state machine a deferred-completion substrate would.
//!
//! Waiters park on a condition variable paired with the mailbox lock
//! and re-check the completion map on every wakeup. Matching an arrival
//! and claiming a completion happen under one lock, so concurrent
//! `wait_any` calls on the same endpoint never lose an arrival another
//! thread ingested on their behalf.
//!
//! Used by the test suites in place of a live multi-process transport,
//! and by single-machine runs that partition one process into several
//! logical domains.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use halo_core::{Rank, RecvHandle, SendHandle, Tag, Transport, TransportError};

/// A message in flight between two endpoints.
struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
}

/// A posted receive waiting for a matching arrival.
struct PostedRecv {
    handle: u64,
    source: Rank,
    tag: Tag,
    max_bytes: usize,
}

/// Matching state shared by all callers of one endpoint.
#[derive(Default)]
struct MatchState {
    /// Arrivals not yet matched to a posted receive, in arrival order.
    arrived: VecDeque<Envelope>,
    /// Posted receives in posting order.
    posted: Vec<PostedRecv>,
    /// Matched receives not yet returned by `wait_any`.
    completed: HashMap<u64, Vec<u8>>,
    next_recv: u64,
}

impl MatchState {
    /// Match unclaimed arrivals against posted receives.
    ///
    /// Earliest arrival first; among posted receives for the same
    /// `(source, tag)`, earliest posted first.
    fn match_arrivals(&mut self) -> Result<(), TransportError> {
        let mut i = 0;
        while i < self.arrived.len() {
            let source = self.arrived[i].source;
            let tag = self.arrived[i].tag;
            let slot = self
                .posted
                .iter()
                .position(|p| p.source == source && p.tag == tag);
            match slot {
                Some(p) => {
                    let posted = self.posted.remove(p);
                    let env = self.arrived.remove(i).expect("index in range");
                    if env.payload.len() > posted.max_bytes {
                        return Err(TransportError::MessageTooLarge {
                            source,
                            posted: posted.max_bytes,
                            received: env.payload.len(),
                        });
                    }
                    self.completed.insert(posted.handle, env.payload);
                    // Removal shifted the deque; rescan from the front.
                    i = 0;
                }
                None => i += 1,
            }
        }
        Ok(())
    }
}

/// One endpoint's incoming side: the matching state plus the condition
/// variable its waiters park on. Senders deliver into it directly.
#[derive(Default)]
struct Mailbox {
    state: Mutex<MatchState>,
    arrivals: Condvar,
}

impl Mailbox {
    fn lock_state(&self) -> MutexGuard<'_, MatchState> {
        self.state.lock().expect("loopback state lock poisoned")
    }
}

/// One endpoint of a loopback fabric.
///
/// Implements [`Transport`]; safe to share across threads, including
/// several threads waiting on the same endpoint concurrently. Each
/// endpoint holds a handle to every peer's mailbox (its own included,
/// so self-sends work).
pub struct LoopbackEndpoint {
    rank: Rank,
    peers: Vec<Arc<Mailbox>>,
    next_send: AtomicU64,
}

impl LoopbackEndpoint {
    /// Number of endpoints in the fabric this endpoint belongs to.
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn own_mailbox(&self) -> &Mailbox {
        &self.peers[self.rank.0 as usize]
    }
}

impl Transport for LoopbackEndpoint {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn post_send(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Vec<u8>,
    ) -> Result<SendHandle, TransportError> {
        let mailbox = self
            .peers
            .get(dest.0 as usize)
            .ok_or(TransportError::UnknownPeer { rank: dest })?;
        mailbox.lock_state().arrived.push_back(Envelope {
            source: self.rank,
            tag,
            payload,
        });
        mailbox.arrivals.notify_all();
        Ok(SendHandle(self.next_send.fetch_add(1, Ordering::Relaxed)))
    }

    fn post_recv(
        &self,
        source: Rank,
        tag: Tag,
        max_bytes: usize,
    ) -> Result<RecvHandle, TransportError> {
        if source.0 as usize >= self.peers.len() {
            return Err(TransportError::UnknownPeer { rank: source });
        }
        let mut state = self.own_mailbox().lock_state();
        let handle = state.next_recv;
        state.next_recv += 1;
        state.posted.push(PostedRecv {
            handle,
            source,
            tag,
            max_bytes,
        });
        Ok(RecvHandle(handle))
    }

    fn wait_any(&self, pending: &[RecvHandle]) -> Result<(usize, Vec<u8>), TransportError> {
        assert!(!pending.is_empty(), "wait_any called with no pending receives");
        let mailbox = self.own_mailbox();
        let mut state = mailbox.lock_state();
        loop {
            state.match_arrivals()?;
            if let Some(i) = pending
                .iter()
                .position(|h| state.completed.contains_key(&h.0))
            {
                let bytes = state
                    .completed
                    .remove(&pending[i].0)
                    .expect("completion present");
                return Ok((i, bytes));
            }
            // Parks until a sender delivers; another waiter may have
            // matched this thread's completion in the meantime, which
            // the re-check above picks up.
            state = mailbox
                .arrivals
                .wait(state)
                .expect("loopback state lock poisoned");
        }
    }

    fn wait_sends(&self, _pending: &[SendHandle]) -> Result<(), TransportError> {
        // Delivery happened at post time.
        Ok(())
    }
}

/// Build a fully connected loopback fabric of `n` endpoints.
///
/// Endpoint `i` has rank `Rank(i)`. Endpoints are independent values
/// and may be moved to separate threads, one per simulated process.
pub fn loopback_fabric(n: usize) -> Vec<LoopbackEndpoint> {
    let mailboxes: Vec<Arc<Mailbox>> = (0..n).map(|_| Arc::new(Mailbox::default())).collect();
    (0..n)
        .map(|i| LoopbackEndpoint {
            rank: Rank(i as u32),
            peers: mailboxes.clone(),
            next_send: AtomicU64::new(0),
        })
        .collect()
}
