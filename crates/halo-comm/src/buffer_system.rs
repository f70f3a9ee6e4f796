//! Per-iteration orchestration of sends, receives, and cycle closure.
//!
//! [`BufferSystem`] owns the partner tables (outgoing buffer per send
//! rank, [`ReceiveInfo`](crate::strategy::ReceiveInfo) per receive
//! rank) and one transport policy. Callers pack directly into
//! [`send_buffer`](BufferSystem::send_buffer), hand buffers off with
//! [`send`](BufferSystem::send), and drain completions with
//! [`wait_for_next`](BufferSystem::wait_for_next) until it returns
//! `None` — the order completions arrive in is nondeterministic and
//! must not be relied upon; only completeness (every registered
//! partner appears exactly once) is contractual.

use std::sync::Arc;

use indexmap::IndexMap;

use halo_core::{Rank, RecvBuffer, SendBuffer, Tag, Transport};

use crate::error::CommError;
use crate::known::KnownSizeComm;
use crate::local::LocalComm;
use crate::metrics::CommStats;
use crate::strategy::{PartnerTable, ReceiveInfo, Strategy};
use crate::unknown::UnknownSizeComm;

#[derive(Default)]
struct SendEntry {
    buffer: SendBuffer,
    /// Set once the buffer is handed to the transport this cycle.
    sent: bool,
}

/// Per-iteration communication orchestrator for one tag.
///
/// Constructed once with a transport handle and a distinguishing tag
/// (messages on different tags never collide), or in local mode for
/// single-process runs. Receiver declarations select the transport
/// policy; see [`set_receiver_info`](Self::set_receiver_info) and
/// [`set_receiver_info_sized`](Self::set_receiver_info_sized).
///
/// Must not be dropped while a cycle is in flight; drive
/// [`wait_for_next`](Self::wait_for_next) to `None` first.
pub struct BufferSystem {
    strategy: Strategy,
    transport: Option<Arc<dyn Transport>>,
    tag: Tag,
    recv_infos: PartnerTable,
    send_entries: IndexMap<Rank, SendEntry>,
    /// Caller declared message sizes constant across cycles.
    fixed_sizes: bool,
    /// Sizes are present in the receive table (declared or cached).
    sizes_cached: bool,
    comm_running: bool,
    stats: CommStats,
}

impl BufferSystem {
    /// Create a buffer system on `transport`, namespaced by `tag`.
    ///
    /// Starts with the unknown-size policy; declare receiver info to
    /// select another. The tag must be unique among concurrently
    /// active buffer systems sharing the transport.
    pub fn new(transport: Arc<dyn Transport>, tag: Tag) -> Self {
        let strategy = Strategy::Unknown(UnknownSizeComm::new(Arc::clone(&transport), tag));
        Self {
            strategy,
            transport: Some(transport),
            tag,
            recv_infos: PartnerTable::new(),
            send_entries: IndexMap::new(),
            fixed_sizes: false,
            sizes_cached: false,
            comm_running: false,
            stats: CommStats::default(),
        }
    }

    /// Create a buffer system in local (no-transport) mode.
    pub fn local(tag: Tag) -> Self {
        Self {
            strategy: Strategy::Local(LocalComm::new()),
            transport: None,
            tag,
            recv_infos: PartnerTable::new(),
            send_entries: IndexMap::new(),
            fixed_sizes: false,
            sizes_cached: false,
            comm_running: false,
            stats: CommStats::default(),
        }
    }

    /// The tag this system is namespaced by.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// This endpoint's rank, or `None` in local mode.
    pub fn rank(&self) -> Option<Rank> {
        self.transport.as_ref().map(|t| t.rank())
    }

    /// Declare the set of ranks a message is expected from each cycle.
    ///
    /// With `sizes_change_each_cycle` the two-phase unknown-size
    /// handshake runs every cycle. Without it, the handshake runs once,
    /// the observed sizes are cached, and subsequent cycles use the
    /// known-size policy — all participants sharing the tag must make
    /// the same declaration, since it changes the wire format after
    /// the first cycle.
    ///
    /// Replaces any previous declaration and resets the policy.
    pub fn set_receiver_info(
        &mut self,
        ranks: impl IntoIterator<Item = Rank>,
        sizes_change_each_cycle: bool,
    ) -> Result<(), CommError> {
        if self.comm_running {
            return Err(CommError::ReceivesAlreadyScheduled);
        }
        self.recv_infos = ranks
            .into_iter()
            .map(|r| (r, ReceiveInfo::unknown()))
            .collect();
        self.fixed_sizes = !sizes_change_each_cycle;
        self.sizes_cached = false;
        self.strategy = self.fresh_strategy(false);
        Ok(())
    }

    /// Declare expected receives with externally pre-computed byte
    /// counts, selecting the known-size policy immediately.
    pub fn set_receiver_info_sized(
        &mut self,
        sizes: impl IntoIterator<Item = (Rank, usize)>,
    ) -> Result<(), CommError> {
        if self.comm_running {
            return Err(CommError::ReceivesAlreadyScheduled);
        }
        self.recv_infos = sizes
            .into_iter()
            .map(|(r, n)| (r, ReceiveInfo::sized(n)))
            .collect();
        self.fixed_sizes = true;
        self.sizes_cached = true;
        self.strategy = self.fresh_strategy(true);
        Ok(())
    }

    fn fresh_strategy(&self, known: bool) -> Strategy {
        match &self.transport {
            None => Strategy::Local(LocalComm::new()),
            Some(t) if known => Strategy::Known(KnownSizeComm::new(Arc::clone(t), self.tag)),
            Some(t) => Strategy::Unknown(UnknownSizeComm::new(Arc::clone(t), self.tag)),
        }
    }

    /// The outgoing buffer for `rank`, allocated on first use.
    /// Callers pack into it directly, then call [`send`](Self::send).
    pub fn send_buffer(&mut self, rank: Rank) -> &mut SendBuffer {
        &mut self.send_entries.entry(rank).or_default().buffer
    }

    /// Hand `rank`'s packed buffer to the transport.
    ///
    /// The bytes move out; the buffer stays registered, empty, for the
    /// next cycle. At most one send per rank per cycle.
    pub fn send(&mut self, rank: Rank) -> Result<(), CommError> {
        let entry = self.send_entries.entry(rank).or_default();
        if entry.sent {
            return Err(CommError::SendInFlight { rank });
        }
        entry.sent = true;
        let bytes = entry.buffer.take_bytes();
        self.post(rank, bytes)
    }

    /// Send every registered buffer not yet sent this cycle, and mark
    /// the cycle running even when there is nothing to send, so an
    /// empty partner set still closes correctly.
    pub fn send_all(&mut self) -> Result<(), CommError> {
        let unsent: Vec<Rank> = self
            .send_entries
            .iter()
            .filter(|(_, e)| !e.sent)
            .map(|(&r, _)| r)
            .collect();
        for rank in unsent {
            self.send(rank)?;
        }
        self.comm_running = true;
        Ok(())
    }

    fn post(&mut self, rank: Rank, bytes: Vec<u8>) -> Result<(), CommError> {
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes.len() as u64;
        self.comm_running = true;
        self.strategy.send(rank, bytes)
    }

    /// Post a non-blocking receive for every declared partner.
    pub fn schedule_receives(&mut self) -> Result<(), CommError> {
        log::debug!(
            "tag {}: scheduling {} receives",
            self.tag,
            self.recv_infos.len()
        );
        self.strategy.schedule_receives(&mut self.recv_infos)?;
        self.comm_running = true;
        Ok(())
    }

    /// Block until the next receive completes and return its rank and
    /// bytes; `Ok(None)` once every scheduled receive has completed.
    ///
    /// Drive this in a loop until `None`: observing the end of the
    /// completion stream also waits out the cycle's sends and reopens
    /// the system for the next iteration.
    pub fn wait_for_next(&mut self) -> Result<Option<(Rank, RecvBuffer)>, CommError> {
        match self.strategy.wait_for_next_receive(&mut self.recv_infos)? {
            Some(rank) => {
                let info = self
                    .recv_infos
                    .get_mut(&rank)
                    .ok_or(CommError::UnregisteredRank { rank })?;
                let buffer = std::mem::take(&mut info.buffer);
                self.stats.messages_received += 1;
                self.stats.bytes_received += buffer.len() as u64;
                Ok(Some((rank, buffer)))
            }
            None => {
                self.close_cycle()?;
                Ok(None)
            }
        }
    }

    /// Wait out pending sends, reset per-cycle flags, and — on the
    /// first closed cycle of a fixed-size declaration — cache the
    /// observed sizes and switch to the known-size policy.
    fn close_cycle(&mut self) -> Result<(), CommError> {
        if !self.comm_running {
            return Ok(());
        }
        self.strategy.wait_for_sends()?;
        for entry in self.send_entries.values_mut() {
            entry.sent = false;
        }
        if self.fixed_sizes && !self.sizes_cached {
            self.sizes_cached = true;
            self.strategy = self.fresh_strategy(true);
        }
        self.stats.cycles += 1;
        self.comm_running = false;
        log::debug!("tag {}: cycle {} closed", self.tag, self.stats.cycles);
        Ok(())
    }

    /// Whether a cycle is currently in flight.
    pub fn is_communication_running(&self) -> bool {
        self.comm_running
    }

    /// Ranks a message is expected from each cycle.
    pub fn receiver_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.recv_infos.keys().copied()
    }

    /// Ranks with a registered outgoing buffer.
    pub fn sender_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        self.send_entries.keys().copied()
    }

    /// Lifetime statistics.
    pub fn stats(&self) -> &CommStats {
        &self.stats
    }

    /// Take `rank`'s outgoing buffer out of the table for exclusive
    /// packing by a worker thread. Pair with
    /// [`send_packed`](Self::send_packed).
    pub(crate) fn take_send_buffer(&mut self, rank: Rank) -> SendBuffer {
        std::mem::take(&mut self.send_entries.entry(rank).or_default().buffer)
    }

    /// Post a buffer previously taken with
    /// [`take_send_buffer`](Self::take_send_buffer).
    pub(crate) fn send_packed(&mut self, rank: Rank, buffer: SendBuffer) -> Result<(), CommError> {
        let entry = self.send_entries.entry(rank).or_default();
        if entry.sent {
            return Err(CommError::SendInFlight { rank });
        }
        entry.sent = true;
        self.post(rank, buffer.into_vec())
    }

    #[cfg(test)]
    pub(crate) fn strategy_is_known(&self) -> bool {
        matches!(self.strategy, Strategy::Known(_))
    }
}

impl Drop for BufferSystem {
    fn drop(&mut self) {
        if self.comm_running {
            log::warn!(
                "tag {}: buffer system dropped with communication in flight",
                self.tag
            );
        }
    }
}
