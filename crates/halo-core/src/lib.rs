//! Core types and traits for the Halo communication subsystem.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Halo workspace:
//! rank and tag identifiers, the send/receive byte buffers, error
//! types, and the [`Transport`] trait that seams the subsystem off
//! from the underlying message-passing substrate.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod error;
pub mod id;
pub mod transport;

pub use buffer::{RecvBuffer, SendBuffer};
pub use error::{BufferError, TransportError};
pub use id::{Rank, Tag};
pub use transport::{RecvHandle, SendHandle, Transport};
