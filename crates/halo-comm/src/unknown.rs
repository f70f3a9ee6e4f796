//! Unknown-size policy: a two-phase handshake per partner.
//!
//! For messages whose length varies iteration to iteration. Phase 1
//! posts a small fixed-size receive for a little-endian u64 byte
//! count; on its completion a receive of exactly that many bytes is
//! posted immediately, and only that phase-2 completion is surfaced to
//! the caller. Sends mirror the sequence: byte count first, payload
//! second, so the receiver's phases match.
//!
//! `size_received` tracks which phase each rank is in, so repeated
//! polling is idempotent and phase 1 is never re-posted.

use std::sync::Arc;

use smallvec::SmallVec;

use halo_core::{Rank, RecvBuffer, RecvHandle, SendHandle, Tag, Transport};

use crate::error::CommError;
use crate::strategy::PartnerTable;

/// Byte length of the phase-1 size message.
const SIZE_HEADER_BYTES: usize = 8;

struct PendingRecv {
    rank: Rank,
    handle: RecvHandle,
    /// False while the phase-1 size message is outstanding.
    size_received: bool,
}

pub(crate) struct UnknownSizeComm {
    transport: Arc<dyn Transport>,
    tag: Tag,
    receiving: bool,
    send_reqs: SmallVec<[SendHandle; 16]>,
    pending: Vec<PendingRecv>,
}

impl UnknownSizeComm {
    pub fn new(transport: Arc<dyn Transport>, tag: Tag) -> Self {
        Self {
            transport,
            tag,
            receiving: false,
            send_reqs: SmallVec::new(),
            pending: Vec::new(),
        }
    }

    pub fn send(&mut self, rank: Rank, payload: Vec<u8>) -> Result<(), CommError> {
        let header = (payload.len() as u64).to_le_bytes().to_vec();
        self.send_reqs
            .push(self.transport.post_send(rank, self.tag, header)?);
        self.send_reqs
            .push(self.transport.post_send(rank, self.tag, payload)?);
        Ok(())
    }

    pub fn wait_for_sends(&mut self) -> Result<(), CommError> {
        if !self.send_reqs.is_empty() {
            self.transport.wait_sends(&self.send_reqs)?;
            self.send_reqs.clear();
        }
        Ok(())
    }

    pub fn schedule_receives(&mut self, infos: &mut PartnerTable) -> Result<(), CommError> {
        if self.receiving {
            return Err(CommError::ReceivesAlreadyScheduled);
        }
        for (&rank, info) in infos.iter_mut() {
            // Size is discovered this cycle; whatever is left over from
            // the previous one is stale.
            info.size = None;
            let handle = self
                .transport
                .post_recv(rank, self.tag, SIZE_HEADER_BYTES)?;
            self.pending.push(PendingRecv {
                rank,
                handle,
                size_received: false,
            });
        }
        self.receiving = true;
        Ok(())
    }

    pub fn wait_for_next_receive(
        &mut self,
        infos: &mut PartnerTable,
    ) -> Result<Option<Rank>, CommError> {
        loop {
            if self.pending.is_empty() {
                self.receiving = false;
                return Ok(None);
            }
            let handles: SmallVec<[RecvHandle; 8]> =
                self.pending.iter().map(|p| p.handle).collect();
            let (idx, bytes) = self.transport.wait_any(&handles)?;

            if !self.pending[idx].size_received {
                // Phase 1 completed: post phase 2 for the announced
                // size. Not yet a completion from the caller's view.
                let rank = self.pending[idx].rank;
                let header: [u8; SIZE_HEADER_BYTES] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| CommError::SizeHeaderCorrupt {
                        rank,
                        len: bytes.len(),
                    })?;
                let size = u64::from_le_bytes(header) as usize;
                let info = infos
                    .get_mut(&rank)
                    .ok_or(CommError::UnregisteredRank { rank })?;
                info.size = Some(size);
                self.pending[idx].handle = self.transport.post_recv(rank, self.tag, size)?;
                self.pending[idx].size_received = true;
            } else {
                let done = self.pending.swap_remove(idx);
                let rank = done.rank;
                let info = infos
                    .get_mut(&rank)
                    .ok_or(CommError::UnregisteredRank { rank })?;
                let expected = info.size.ok_or(CommError::ReceiveSizeUnknown { rank })?;
                if bytes.len() != expected {
                    return Err(CommError::SizeMismatch {
                        rank,
                        expected,
                        got: bytes.len(),
                    });
                }
                info.buffer = RecvBuffer::from(bytes);
                return Ok(Some(rank));
            }
        }
    }
}
