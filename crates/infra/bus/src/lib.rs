//! Shared-memory transport between the execution core and the order router
//!
//! Three queues carry market data in, requests out and responses in; a
//! counter store mints client IDs. Segments are System V shared memory keyed
//! the way the router keys them, or files mapped with `memmap2` for tests;
//! see [`segment`].
//!
//! Enqueue is lock-free under any number of writers. Dequeue is
//! single-reader and never blocks inside the transport beyond the explicit
//! spin in [`MwmrQueue::dequeue`]; callers choose their own backoff around
//! [`MwmrQueue::try_dequeue`].

#![deny(clippy::all)]

pub mod client_store;
pub mod error;
pub mod queue;
pub mod segment;
#[cfg(unix)]
mod sysv;

pub use client_store::ClientStore;
pub use error::TransportError;
pub use queue::{MwmrQueue, QueueWriter, ShmRecord, elem_size};
pub use segment::{DEFAULT_SHM_DIR, SegmentBackend, ShmSegment, segment_path};
