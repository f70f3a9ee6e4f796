//! All-to-all exchange with fully parallel pack and unpack on every
//! rank, repeated over several cycles. Exercises the worker pools and
//! the one-lock transport discipline under real contention.

use std::sync::{Arc, Mutex};
use std::thread;

use halo_comm::{BufferSystem, CallbackBufferSystem, OverlapConfig};
use halo_core::{Rank, Tag};
use halo_loopback::loopback_fabric;

const RANKS: u32 = 4;
const WORDS: u32 = 256;
const CYCLES: usize = 3;

fn expected_word(sender: u32, i: u32) -> u32 {
    sender * 100_000 + i
}

#[test]
fn parallel_all_to_all_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut handles = Vec::new();
    for (r, ep) in (0..RANKS).zip(loopback_fabric(RANKS as usize)) {
        handles.push(thread::spawn(move || {
            let bs = BufferSystem::new(Arc::new(ep), Tag(9));
            let mut comm = CallbackBufferSystem::new(bs, OverlapConfig::parallel());

            let completed = Arc::new(Mutex::new(0usize));
            for peer in (0..RANKS).filter(|&p| p != r) {
                comm.add_packer(Rank(peer), move |buf| {
                    for i in 0..WORDS {
                        buf.put_u32(expected_word(r, i));
                    }
                });
                let completed = Arc::clone(&completed);
                comm.add_unpacker(Rank(peer), move |buf| {
                    for i in 0..WORDS {
                        assert_eq!(buf.get_u32().unwrap(), expected_word(peer, i));
                    }
                    assert!(buf.is_exhausted());
                    *completed.lock().unwrap() += 1;
                });
            }

            for _ in 0..CYCLES {
                comm.start_communication().unwrap();
                comm.wait().unwrap();
            }
            assert_eq!(*completed.lock().unwrap(), CYCLES * (RANKS as usize - 1));
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn constant_sizes_survive_parallel_overlap() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut handles = Vec::new();
    for (r, ep) in (0..2u32).zip(loopback_fabric(2)) {
        handles.push(thread::spawn(move || {
            let peer = 1 - r;
            let bs = BufferSystem::new(Arc::new(ep), Tag(2));
            let mut comm = CallbackBufferSystem::new(bs, OverlapConfig::parallel());
            comm.set_constant_message_sizes(true);

            let total = Arc::new(Mutex::new(0u64));
            let sink = Arc::clone(&total);
            comm.add_packer(Rank(peer), move |buf| buf.put_u64(u64::from(r) + 1));
            comm.add_unpacker(Rank(peer), move |buf| {
                *sink.lock().unwrap() += buf.get_u64().unwrap();
            });

            for _ in 0..CYCLES {
                comm.start_communication().unwrap();
                comm.wait().unwrap();
            }
            assert_eq!(*total.lock().unwrap(), (u64::from(peer) + 1) * CYCLES as u64);
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
