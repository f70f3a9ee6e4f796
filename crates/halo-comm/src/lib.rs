//! Per-iteration buffer communication between partner ranks.
//!
//! The subsystem lets simulation components exchange arbitrarily many
//! point-to-point messages once per iteration, overlapped across worker
//! threads, with deterministic completion semantics. Three
//! interchangeable transport policies sit behind one contract:
//!
//! - **Known-Size** — every receive is posted with its exact byte
//!   count, pre-computed or cached from an earlier cycle.
//! - **Unknown-Size** — a two-phase handshake per rank: a small
//!   fixed-size message carries the byte count, then the payload
//!   follows; only the payload completion is surfaced to the caller.
//! - **Local** — the degenerate single-process mode where
//!   communication is a buffer copy.
//!
//! [`BufferSystem`] owns the partner tables and the per-cycle state
//! machine; [`CallbackBufferSystem`] adds the caller-facing
//! register-callbacks-then-run model with optional thread overlap.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer_system;
pub mod callback_system;
pub mod config;
pub mod error;
pub mod metrics;

mod known;
mod local;
mod strategy;
mod unknown;

pub use buffer_system::BufferSystem;
pub use callback_system::{CallbackBufferSystem, PackFn, UnpackFn};
pub use config::OverlapConfig;
pub use error::CommError;
pub use metrics::CommStats;
