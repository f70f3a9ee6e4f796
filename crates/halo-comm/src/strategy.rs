//! The common contract behind the three transport policies.
//!
//! Every policy drives two independent state machines per cycle:
//! sending (`send`* → `wait_for_sends`) and receiving
//! (`schedule_receives` → `wait_for_next_receive`* until `None`). The
//! two may interleave freely, but re-entering either machine before its
//! previous cycle closed is a protocol error.

use indexmap::IndexMap;

use halo_core::{Rank, RecvBuffer};

use crate::error::CommError;
use crate::known::KnownSizeComm;
use crate::local::LocalComm;
use crate::unknown::UnknownSizeComm;

/// Receive-side bookkeeping for one partner rank.
///
/// Pairs the landing buffer with the expected byte count. Known-size
/// scheduling requires `size` to be valid up front; the unknown-size
/// handshake fills it in as a side effect of phase 1.
#[derive(Debug, Default)]
pub(crate) struct ReceiveInfo {
    /// Landing buffer, replaced wholesale when the receive completes.
    pub buffer: RecvBuffer,
    /// Expected (or, after completion, actual) message byte count.
    pub size: Option<usize>,
}

impl ReceiveInfo {
    /// An entry whose size the handshake will discover.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// An entry with a pre-known exact byte count.
    pub fn sized(size: usize) -> Self {
        Self {
            buffer: RecvBuffer::new(),
            size: Some(size),
        }
    }
}

/// Receive-side partner table: one entry per rank a message is
/// expected from this cycle. Key-unique; a completion for a rank
/// outside this table is a protocol error.
pub(crate) type PartnerTable = IndexMap<Rank, ReceiveInfo>;

/// The transport policy selected when receiver info is declared.
///
/// A tagged variant instead of trait objects: the choice is made once
/// per configuration, never re-dispatched per call site.
pub(crate) enum Strategy {
    Known(KnownSizeComm),
    Unknown(UnknownSizeComm),
    Local(LocalComm),
}

impl Strategy {
    /// Enqueue a non-blocking send of `payload` to `rank`.
    pub fn send(&mut self, rank: Rank, payload: Vec<u8>) -> Result<(), CommError> {
        match self {
            Self::Known(s) => s.send(rank, payload),
            Self::Unknown(s) => s.send(rank, payload),
            Self::Local(s) => s.send(rank, payload),
        }
    }

    /// Block until every send posted this cycle has completed.
    /// A no-op with zero pending sends.
    pub fn wait_for_sends(&mut self) -> Result<(), CommError> {
        match self {
            Self::Known(s) => s.wait_for_sends(),
            Self::Unknown(s) => s.wait_for_sends(),
            Self::Local(s) => s.wait_for_sends(),
        }
    }

    /// Post a non-blocking receive for every rank in `infos`.
    pub fn schedule_receives(&mut self, infos: &mut PartnerTable) -> Result<(), CommError> {
        match self {
            Self::Known(s) => s.schedule_receives(infos),
            Self::Unknown(s) => s.schedule_receives(infos),
            Self::Local(s) => s.schedule_receives(infos),
        }
    }

    /// Block until the next scheduled receive completes; fill that
    /// rank's entry in `infos` and return the rank. Returns `Ok(None)`
    /// once every scheduled receive has completed, closing the
    /// receive cycle.
    pub fn wait_for_next_receive(
        &mut self,
        infos: &mut PartnerTable,
    ) -> Result<Option<Rank>, CommError> {
        match self {
            Self::Known(s) => s.wait_for_next_receive(infos),
            Self::Unknown(s) => s.wait_for_next_receive(infos),
            Self::Local(s) => s.wait_for_next_receive(infos),
        }
    }
}
