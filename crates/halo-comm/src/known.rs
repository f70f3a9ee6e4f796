//! Known-size policy: one receive per partner, posted with its exact
//! byte count.
//!
//! Used when every iteration's message sizes are identical or
//! externally pre-computed, e.g. a fixed halo-exchange layout.
//! Completion is detected by a wait-any over the outstanding request
//! set; the completing request's rank is returned and removed.

use std::sync::Arc;

use smallvec::SmallVec;

use halo_core::{Rank, RecvBuffer, RecvHandle, SendHandle, Tag, Transport};

use crate::error::CommError;
use crate::strategy::PartnerTable;

pub(crate) struct KnownSizeComm {
    transport: Arc<dyn Transport>,
    tag: Tag,
    receiving: bool,
    send_reqs: SmallVec<[SendHandle; 8]>,
    recv_reqs: SmallVec<[RecvHandle; 8]>,
    /// Rank of the receive at the same index in `recv_reqs`.
    recv_ranks: SmallVec<[Rank; 8]>,
}

impl KnownSizeComm {
    pub fn new(transport: Arc<dyn Transport>, tag: Tag) -> Self {
        Self {
            transport,
            tag,
            receiving: false,
            send_reqs: SmallVec::new(),
            recv_reqs: SmallVec::new(),
            recv_ranks: SmallVec::new(),
        }
    }

    pub fn send(&mut self, rank: Rank, payload: Vec<u8>) -> Result<(), CommError> {
        let handle = self.transport.post_send(rank, self.tag, payload)?;
        self.send_reqs.push(handle);
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
        for (&rank, info) in infos.iter() {
            let size = info.size.ok_or(CommError::ReceiveSizeUnknown { rank })?;
            let handle = self.transport.post_recv(rank, self.tag, size)?;
            self.recv_reqs.push(handle);
            self.recv_ranks.push(rank);
        }
        self.receiving = true;
        Ok(())
    }

    pub fn wait_for_next_receive(
        &mut self,
        infos: &mut PartnerTable,
    ) -> Result<Option<Rank>, CommError> {
        if self.recv_reqs.is_empty() {
            self.receiving = false;
            return Ok(None);
        }
        let (idx, bytes) = self.transport.wait_any(&self.recv_reqs)?;
        self.recv_reqs.swap_remove(idx);
        let rank = self.recv_ranks.swap_remove(idx);

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
        Ok(Some(rank))
    }
}
