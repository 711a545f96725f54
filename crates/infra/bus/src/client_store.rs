//! Shared counter used to mint client IDs
//!
//! Layout (16 bytes): `data: u64` (atomic) then `first_client_id: u64`.

use crate::error::TransportError;
use crate::segment::{SegmentBackend, ShmSegment};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

const STORE_LEN: usize = 16;

pub struct ClientStore {
    segment: ShmSegment,
}

impl ClientStore {
    /// Allocate the store and seed both fields with `initial`
    pub fn create_on(
        backend: &SegmentBackend,
        key: u32,
        initial: u64,
    ) -> Result<Self, TransportError> {
        let store = Self {
            segment: backend.create(key, STORE_LEN)?,
        };
        store.seed(initial);
        info!(key, initial, "created client store");
        Ok(store)
    }

    pub fn open_on(backend: &SegmentBackend, key: u32) -> Result<Self, TransportError> {
        Ok(Self {
            segment: backend.open(key, STORE_LEN)?,
        })
    }

    /// File-backed [`ClientStore::create_on`]
    pub fn create(dir: &Path, key: u32, initial: u64) -> Result<Self, TransportError> {
        Self::create_on(&SegmentBackend::File(dir.to_path_buf()), key, initial)
    }

    pub fn open(dir: &Path, key: u32) -> Result<Self, TransportError> {
        Self::open_on(&SegmentBackend::File(dir.to_path_buf()), key)
    }

    /// In-process store, same semantics as [`ClientStore::create`]
    pub fn anonymous(initial: u64) -> Result<Self, TransportError> {
        let store = Self {
            segment: ShmSegment::anonymous(STORE_LEN)?,
        };
        store.seed(initial);
        Ok(store)
    }

    fn seed(&self, initial: u64) {
        self.counter().store(initial, Ordering::Release);
        self.first_id_cell().store(initial, Ordering::Release);
    }

    fn counter(&self) -> &AtomicU64 {
        // SAFETY: offset 0 of a page-aligned mapping of at least 16 bytes
        unsafe { &*self.segment.base().cast::<AtomicU64>() }
    }

    fn first_id_cell(&self) -> &AtomicU64 {
        // SAFETY: offset 8, 8-byte aligned, inside the mapping. Written only
        // by `seed`; an atomic view keeps cross-process reads well defined.
        unsafe { &*self.segment.base().add(8).cast::<AtomicU64>() }
    }

    /// Atomically increment, returning the value before the increment
    pub fn next_id(&self) -> u64 {
        self.counter().fetch_add(1, Ordering::AcqRel)
    }

    #[must_use]
    pub fn current(&self) -> u64 {
        self.counter().load(Ordering::Acquire)
    }

    #[must_use]
    pub fn first_client_id(&self) -> u64 {
        self.first_id_cell().load(Ordering::Acquire)
    }

    pub fn remove(&self) -> Result<(), TransportError> {
        self.segment.remove()
    }
}
