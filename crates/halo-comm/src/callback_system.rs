//! Register-callbacks-then-run orchestration with optional thread
//! overlap.
//!
//! Callers register one pack and one unpack callback per partner rank,
//! then drive each iteration with a single
//! [`start_communication`](CallbackBufferSystem::start_communication) /
//! [`wait`](CallbackBufferSystem::wait) pair. In parallel mode the
//! callbacks run across a bounded pool of scoped worker threads; every
//! call into the underlying buffer system is serialized behind a mutex
//! (the transport layer is not assumed thread-safe), so the critical
//! section covers the transport-posting instant, never callback
//! execution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;

use halo_core::{Rank, RecvBuffer, SendBuffer};

use crate::buffer_system::BufferSystem;
use crate::config::OverlapConfig;
use crate::error::CommError;

/// Fills one partner's outgoing buffer; runs once per cycle.
pub type PackFn = Box<dyn Fn(&mut SendBuffer) + Send + Sync>;

/// Consumes one partner's received message; runs once per cycle.
pub type UnpackFn = Box<dyn Fn(&mut RecvBuffer) + Send + Sync>;

/// Store the first error a worker hits; later ones lose the race and
/// are dropped — they are all fatal anyway.
fn record_first(slot: &Mutex<Option<CommError>>, err: CommError) {
    let mut guard = slot.lock().expect("error slot lock poisoned");
    if guard.is_none() {
        *guard = Some(err);
    }
}

/// The caller-facing layer: callbacks per partner rank, one
/// start/wait pair per iteration.
///
/// Registrations may change between iterations; any change invalidates
/// the cached partner tables, which are rebuilt on the next
/// [`start_communication`](Self::start_communication). Callbacks close
/// over caller-owned simulation state; with a parallel
/// [`OverlapConfig`] they must therefore synchronize their own shared
/// state (`Send + Sync` is required either way).
pub struct CallbackBufferSystem {
    bs: BufferSystem,
    overlap: OverlapConfig,
    packers: IndexMap<Rank, PackFn>,
    unpackers: IndexMap<Rank, UnpackFn>,
    /// Message sizes are constant across cycles; enables the
    /// size-caching fast path after the first cycle.
    constant_sizes: bool,
    dirty: bool,
}

impl CallbackBufferSystem {
    /// Wrap `bs` with the given overlap mode.
    pub fn new(bs: BufferSystem, overlap: OverlapConfig) -> Self {
        Self {
            bs,
            overlap,
            packers: IndexMap::new(),
            unpackers: IndexMap::new(),
            constant_sizes: false,
            dirty: true,
        }
    }

    /// Register (or replace) the pack callback for `rank`.
    pub fn add_packer(
        &mut self,
        rank: Rank,
        pack: impl Fn(&mut SendBuffer) + Send + Sync + 'static,
    ) {
        self.dirty = true;
        self.packers.insert(rank, Box::new(pack));
    }

    /// Register (or replace) the unpack callback for `rank`. The set
    /// of unpacker ranks is the set of expected receives per cycle.
    pub fn add_unpacker(
        &mut self,
        rank: Rank,
        unpack: impl Fn(&mut RecvBuffer) + Send + Sync + 'static,
    ) {
        self.dirty = true;
        self.unpackers.insert(rank, Box::new(unpack));
    }

    /// Declare whether message sizes stay constant across cycles.
    /// Defaults to false (the conservative two-phase handshake every
    /// cycle). All participants must declare the same value.
    pub fn set_constant_message_sizes(&mut self, constant: bool) {
        if self.constant_sizes != constant {
            self.constant_sizes = constant;
            self.dirty = true;
        }
    }

    /// The underlying buffer system (statistics, rank queries).
    pub fn buffer_system(&self) -> &BufferSystem {
        &self.bs
    }

    /// Rebuild partner tables after registration changes.
    ///
    /// Pre-creates every send buffer so the parallel pack phase only
    /// ever looks entries up and never grows the shared table.
    fn setup(&mut self) -> Result<(), CommError> {
        if !self.dirty {
            return Ok(());
        }
        self.bs
            .set_receiver_info(self.unpackers.keys().copied(), !self.constant_sizes)?;
        for &rank in self.packers.keys() {
            self.bs.send_buffer(rank);
        }
        // Entries may predate this wrapper; every one needs a packer.
        let stale: Vec<Rank> = self
            .bs
            .sender_ranks()
            .filter(|r| !self.packers.contains_key(r))
            .collect();
        if let Some(&rank) = stale.first() {
            return Err(CommError::MissingPackCallback { rank });
        }
        self.dirty = false;
        Ok(())
    }

    /// Schedule receives, run every pack callback, and post all sends.
    ///
    /// Returns once every send is handed to the transport; the
    /// transfers themselves complete during [`wait`](Self::wait).
    /// Unrelated work may run in between.
    pub fn start_communication(&mut self) -> Result<(), CommError> {
        self.setup()?;
        self.bs.schedule_receives()?;
        if self.overlap.parallel_pack && self.packers.len() > 1 {
            self.start_parallel()?;
        } else {
            self.start_serial()?;
        }
        // Closes the cycle even with zero registered sends.
        self.bs.send_all()
    }

    fn start_serial(&mut self) -> Result<(), CommError> {
        for (&rank, pack) in &self.packers {
            pack(self.bs.send_buffer(rank));
            self.bs.send(rank)?;
        }
        Ok(())
    }

    /// Pack across a worker pool. Each worker owns exactly one rank's
    /// buffer at a time; the transport post runs under the lock.
    fn start_parallel(&mut self) -> Result<(), CommError> {
        let tasks: Vec<(Rank, SendBuffer)> = self
            .packers
            .keys()
            .map(|&rank| (rank, self.bs.take_send_buffer(rank)))
            .collect();
        let workers = self
            .overlap
            .resolved_worker_count()
            .min(tasks.len())
            .max(1);

        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        for task in tasks {
            task_tx.send(task).expect("task channel open");
        }
        drop(task_tx);

        let bs = Mutex::new(&mut self.bs);
        let packers = &self.packers;
        let first_err: Mutex<Option<CommError>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while let Ok((rank, mut buffer)) = task_rx.recv() {
                        match packers.get(&rank) {
                            Some(pack) => pack(&mut buffer),
                            None => {
                                record_first(&first_err, CommError::MissingPackCallback { rank });
                                return;
                            }
                        }
                        let posted = bs
                            .lock()
                            .expect("buffer system lock poisoned")
                            .send_packed(rank, buffer);
                        if let Err(e) = posted {
                            record_first(&first_err, e);
                            return;
                        }
                    }
                });
            }
        });

        match first_err.into_inner().expect("error slot lock poisoned") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drain the completion stream, invoking the matching unpack
    /// callback per completed partner, in completion order.
    ///
    /// After this returns no transport resources remain in flight and
    /// all buffers may be reused.
    pub fn wait(&mut self) -> Result<(), CommError> {
        if !self.bs.is_communication_running() {
            return Ok(());
        }
        if self.overlap.parallel_unpack && self.unpackers.len() > 1 {
            self.wait_parallel()
        } else {
            self.wait_serial()
        }
    }

    fn wait_serial(&mut self) -> Result<(), CommError> {
        while let Some((rank, mut buffer)) = self.bs.wait_for_next()? {
            let unpack = self
                .unpackers
                .get(&rank)
                .ok_or(CommError::MissingUnpackCallback { rank })?;
            unpack(&mut buffer);
        }
        Ok(())
    }

    /// Unpack across a worker pool. `wait_for_next` mutates shared
    /// completion bookkeeping and runs under the lock; the returned
    /// buffer is unpacked outside it, concurrently with other workers.
    /// Workers pull until the stream ends. A recorded error raises the
    /// stop flag under the lock, so the remaining workers exit before
    /// their next pull instead of waiting on receives a fault may have
    /// left permanently pending.
    fn wait_parallel(&mut self) -> Result<(), CommError> {
        let workers = self
            .overlap
            .resolved_worker_count()
            .min(self.unpackers.len())
            .max(1);
        let bs = Mutex::new(&mut self.bs);
        let unpackers = &self.unpackers;
        let first_err: Mutex<Option<CommError>> = Mutex::new(None);
        let stop = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let mut guard = bs.lock().expect("buffer system lock poisoned");
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    match guard.wait_for_next() {
                        Ok(Some((rank, mut buffer))) => {
                            drop(guard);
                            match unpackers.get(&rank) {
                                Some(unpack) => unpack(&mut buffer),
                                None => {
                                    stop.store(true, Ordering::Relaxed);
                                    record_first(
                                        &first_err,
                                        CommError::MissingUnpackCallback { rank },
                                    );
                                    return;
                                }
                            }
                        }
                        Ok(None) => return,
                        Err(e) => {
                            stop.store(true, Ordering::Relaxed);
                            drop(guard);
                            record_first(&first_err, e);
                            return;
                        }
                    }
                });
            }
        });

        match first_err.into_inner().expect("error slot lock poisoned") {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halo_core::Tag;
    use std::sync::Arc;

    #[test]
    fn local_roundtrip_serial() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());

        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);

        cbs.add_packer(Rank(0), |buf| {
            buf.put_u32(7);
            buf.put_u32(11);
        });
        cbs.add_unpacker(Rank(0), move |buf| {
            let mut out = sink.lock().unwrap();
            out.push(buf.get_u32().unwrap());
            out.push(buf.get_u32().unwrap());
        });

        cbs.start_communication().unwrap();
        cbs.wait().unwrap();

        assert_eq!(*received.lock().unwrap(), vec![7, 11]);
    }

    #[test]
    fn repeated_cycles_reuse_setup() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());

        let count = Arc::new(Mutex::new(0u32));
        let sink = Arc::clone(&count);

        cbs.add_packer(Rank(0), |buf| buf.put_u8(1));
        cbs.add_unpacker(Rank(0), move |buf| {
            *sink.lock().unwrap() += u32::from(buf.get_u8().unwrap());
        });

        for _ in 0..5 {
            cbs.start_communication().unwrap();
            cbs.wait().unwrap();
        }
        assert_eq!(*count.lock().unwrap(), 5);
        assert_eq!(cbs.buffer_system().stats().cycles, 5);
    }

    #[test]
    fn delivery_without_unpacker_rank_is_protocol_error() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());

        // Packs toward rank 2, but only rank 0 is expected on receive.
        cbs.add_packer(Rank(2), |buf| buf.put_u8(9));
        cbs.add_unpacker(Rank(0), |_| {});

        cbs.start_communication().unwrap();
        assert_eq!(
            cbs.wait(),
            Err(CommError::UnregisteredRank { rank: Rank(2) })
        );
    }

    #[test]
    fn stale_send_entry_without_packer_is_config_error() {
        let mut bs = BufferSystem::local(Tag(0));
        // An entry created before the wrapper took over.
        bs.send_buffer(Rank(1));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());
        cbs.add_unpacker(Rank(0), |_| {});

        assert_eq!(
            cbs.start_communication(),
            Err(CommError::MissingPackCallback { rank: Rank(1) })
        );
    }

    #[test]
    fn registration_change_marks_dirty_and_rebuilds() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());

        let total = Arc::new(Mutex::new(0u64));
        let sink = Arc::clone(&total);
        cbs.add_packer(Rank(0), |buf| buf.put_u64(1));
        cbs.add_unpacker(Rank(0), move |buf| {
            *sink.lock().unwrap() += buf.get_u64().unwrap();
        });

        cbs.start_communication().unwrap();
        cbs.wait().unwrap();

        // Replace the packer between iterations; the next cycle must
        // pick it up.
        cbs.add_packer(Rank(0), |buf| buf.put_u64(41));
        cbs.start_communication().unwrap();
        cbs.wait().unwrap();

        assert_eq!(*total.lock().unwrap(), 42);
    }

    #[test]
    fn wait_without_start_is_a_no_op() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::default());
        cbs.wait().unwrap();
    }

    #[test]
    fn transport_fault_stops_parallel_wait_workers() {
        use std::sync::atomic::AtomicUsize;

        use halo_core::{RecvHandle, SendHandle, Transport, TransportError};

        /// Fails every wait; counts how often it is asked.
        struct FailingTransport {
            wait_calls: AtomicUsize,
        }

        impl Transport for FailingTransport {
            fn rank(&self) -> Rank {
                Rank(0)
            }

            fn post_send(
                &self,
                _dest: Rank,
                _tag: Tag,
                _payload: Vec<u8>,
            ) -> Result<SendHandle, TransportError> {
                Ok(SendHandle(0))
            }

            fn post_recv(
                &self,
                _source: Rank,
                _tag: Tag,
                _max_bytes: usize,
            ) -> Result<RecvHandle, TransportError> {
                Ok(RecvHandle(0))
            }

            fn wait_any(
                &self,
                _pending: &[RecvHandle],
            ) -> Result<(usize, Vec<u8>), TransportError> {
                self.wait_calls.fetch_add(1, Ordering::Relaxed);
                Err(TransportError::Disconnected { peer: Rank(0) })
            }

            fn wait_sends(&self, _pending: &[SendHandle]) -> Result<(), TransportError> {
                Ok(())
            }
        }

        let transport = Arc::new(FailingTransport {
            wait_calls: AtomicUsize::new(0),
        });
        let bs = BufferSystem::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            Tag(0),
        );
        let overlap = OverlapConfig {
            parallel_pack: false,
            parallel_unpack: true,
            workers: Some(2),
        };
        let mut cbs = CallbackBufferSystem::new(bs, overlap);
        cbs.add_unpacker(Rank(1), |_| {});
        cbs.add_unpacker(Rank(2), |_| {});

        cbs.start_communication().unwrap();
        assert_eq!(
            cbs.wait(),
            Err(CommError::Transport(TransportError::Disconnected {
                peer: Rank(0)
            }))
        );
        // The surviving worker stopped instead of pulling again.
        assert_eq!(transport.wait_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn zero_registered_partners_completes() {
        let bs = BufferSystem::local(Tag(0));
        let mut cbs = CallbackBufferSystem::new(bs, OverlapConfig::parallel());
        cbs.start_communication().unwrap();
        cbs.wait().unwrap();
        assert_eq!(cbs.buffer_system().stats().cycles, 1);
    }
}
