//! Halo: distributed buffer communication for block-structured
//! simulation frameworks.
//!
//! This is the top-level facade crate that re-exports the public API
//! from the Halo sub-crates. For most users, adding `halo` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! A single-process run in local mode — the same code drives a real
//! transport when the domain is partitioned across ranks:
//!
//! ```rust
//! use halo::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let system = BufferSystem::local(Tag(0));
//! let mut comm = CallbackBufferSystem::new(system, OverlapConfig::default());
//!
//! let received = Arc::new(Mutex::new(0u32));
//! let sink = Arc::clone(&received);
//! comm.add_packer(Rank(0), |buf| buf.put_u32(41));
//! comm.add_unpacker(Rank(0), move |buf| {
//!     *sink.lock().unwrap() += buf.get_u32().unwrap() + 1;
//! });
//!
//! comm.start_communication().unwrap();
//! // ... unrelated work overlaps with the transfers here ...
//! comm.wait().unwrap();
//! assert_eq!(*received.lock().unwrap(), 42);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `halo-core` | Ranks, tags, buffers, errors, the `Transport` trait |
//! | [`comm`] | `halo-comm` | `BufferSystem`, `CallbackBufferSystem`, overlap config |
//! | [`loopback`] | `halo-loopback` | In-process transport fabric |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Ranks, tags, buffers, errors, and the transport seam (`halo-core`).
pub mod types {
    pub use halo_core::*;
}

/// Buffer systems and overlap orchestration (`halo-comm`).
pub mod comm {
    pub use halo_comm::*;
}

/// In-process transport fabric (`halo-loopback`).
pub mod loopback {
    pub use halo_loopback::*;
}

/// The most commonly used types, re-exported flat.
pub mod prelude {
    pub use halo_comm::{BufferSystem, CallbackBufferSystem, CommError, CommStats, OverlapConfig};
    pub use halo_core::{Rank, RecvBuffer, SendBuffer, Tag, Transport};
    pub use halo_loopback::loopback_fabric;
}
