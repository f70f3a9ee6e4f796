//! Local policy: the no-transport degenerate mode.
//!
//! When a simulation partition has exactly one unpartitioned domain,
//! communication degenerates to a buffer copy into an internal holding
//! slot. The same state-machine contract holds so callers stay
//! transport-agnostic: the first wait returns the held buffer, the
//! next wait closes the cycle.

use halo_core::{Rank, RecvBuffer};

use crate::error::CommError;
use crate::strategy::PartnerTable;

#[derive(Default)]
pub(crate) struct LocalComm {
    /// At most one send/receive pair is outstanding.
    slot: Option<(Rank, Vec<u8>)>,
    receiving: bool,
}

impl LocalComm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, rank: Rank, payload: Vec<u8>) -> Result<(), CommError> {
        if self.slot.is_some() {
            return Err(CommError::LocalSendPending { rank });
        }
        self.slot = Some((rank, payload));
        Ok(())
    }

    pub fn wait_for_sends(&mut self) -> Result<(), CommError> {
        // The copy completed at send time.
        Ok(())
    }

    pub fn schedule_receives(&mut self, _infos: &mut PartnerTable) -> Result<(), CommError> {
        if self.receiving {
            return Err(CommError::ReceivesAlreadyScheduled);
        }
        self.receiving = true;
        Ok(())
    }

    pub fn wait_for_next_receive(
        &mut self,
        infos: &mut PartnerTable,
    ) -> Result<Option<Rank>, CommError> {
        match self.slot.take() {
            Some((rank, bytes)) => {
                let info = infos
                    .get_mut(&rank)
                    .ok_or(CommError::UnregisteredRank { rank })?;
                info.size = Some(bytes.len());
                info.buffer = RecvBuffer::from(bytes);
                Ok(Some(rank))
            }
            None => {
                self.receiving = false;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ReceiveInfo;
    use indexmap::IndexMap;

    fn table_with(rank: Rank) -> PartnerTable {
        let mut infos = IndexMap::new();
        infos.insert(rank, ReceiveInfo::unknown());
        infos
    }

    #[test]
    fn send_then_wait_returns_identical_bytes() {
        let mut comm = LocalComm::new();
        let mut infos = table_with(Rank(0));

        comm.schedule_receives(&mut infos).unwrap();
        comm.send(Rank(0), vec![1, 2, 3]).unwrap();

        assert_eq!(comm.wait_for_next_receive(&mut infos).unwrap(), Some(Rank(0)));
        let info = infos.get_mut(&Rank(0)).unwrap();
        assert_eq!(info.size, Some(3));
        assert_eq!(info.buffer.get_bytes(3).unwrap(), &[1, 2, 3]);

        // Second wait closes the cycle.
        assert_eq!(comm.wait_for_next_receive(&mut infos).unwrap(), None);
    }

    #[test]
    fn second_outstanding_send_is_rejected() {
        let mut comm = LocalComm::new();
        comm.send(Rank(0), vec![1]).unwrap();
        assert_eq!(
            comm.send(Rank(0), vec![2]),
            Err(CommError::LocalSendPending { rank: Rank(0) })
        );
    }

    #[test]
    fn rescheduling_open_cycle_is_rejected() {
        let mut comm = LocalComm::new();
        let mut infos = table_with(Rank(0));
        comm.schedule_receives(&mut infos).unwrap();
        assert_eq!(
            comm.schedule_receives(&mut infos),
            Err(CommError::ReceivesAlreadyScheduled)
        );
    }

    #[test]
    fn delivery_to_unregistered_rank_is_protocol_error() {
        let mut comm = LocalComm::new();
        let mut infos = table_with(Rank(0));
        comm.schedule_receives(&mut infos).unwrap();
        comm.send(Rank(5), vec![9]).unwrap();
        assert_eq!(
            comm.wait_for_next_receive(&mut infos),
            Err(CommError::UnregisteredRank { rank: Rank(5) })
        );
    }

    #[test]
    fn empty_cycle_closes_immediately() {
        let mut comm = LocalComm::new();
        let mut infos = PartnerTable::new();
        comm.schedule_receives(&mut infos).unwrap();
        assert_eq!(comm.wait_for_next_receive(&mut infos).unwrap(), None);
        // A new cycle may begin after the sentinel.
        comm.schedule_receives(&mut infos).unwrap();
    }
}
