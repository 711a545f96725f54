//! Multi-writer single-reader queue over a shared segment
//!
//! Segment layout, byte-compatible with the order-routing process:
//!
//! ```text
//! +0   head: i64 (atomic, starts at 1)
//! +8   slot[0] { data: T, seq_no: u64 }
//!      slot[1] ...
//! ```
//!
//! Writers reserve a sequence number with one `fetch_add` on `head`, copy
//! their payload into `slot[seq & mask]` and publish by storing `seq_no`
//! last. The reader owns a local tail; a slot whose `seq_no >= tail` holds
//! fresh data.

use crate::error::TransportError;
use crate::segment::{SegmentBackend, ShmSegment};
use common::{MarketUpdate, RequestMsg, ResponseMsg};
use std::marker::PhantomData;
use std::mem::{offset_of, size_of};
use std::path::Path;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::debug;

/// Records that may be copied through a shared segment
///
/// # Safety
/// Implementors must be plain data: `repr(C)`, no pointers or references,
/// and every bit pattern the counterparty can write must be a valid value.
pub unsafe trait ShmRecord: Copy + Send + 'static {}

// SAFETY: repr(C) records made only of integers, floats and byte arrays
unsafe impl ShmRecord for MarketUpdate {}
// SAFETY: as above
unsafe impl ShmRecord for RequestMsg {}
// SAFETY: as above
unsafe impl ShmRecord for ResponseMsg {}
// SAFETY: primitive
unsafe impl ShmRecord for u64 {}

/// Slot as laid out in the segment
#[repr(C)]
pub struct QueueElem<T> {
    pub data: T,
    pub seq_no: u64,
}

const HEADER_SIZE: usize = size_of::<i64>();

/// Bytes occupied by one slot for payload `T`
#[must_use]
pub const fn elem_size<T>() -> usize {
    size_of::<QueueElem<T>>()
}

/// Segment bytes needed for `slots` slots of `T`
#[must_use]
pub const fn segment_len<T>(slots: usize) -> usize {
    HEADER_SIZE + slots * elem_size::<T>()
}

fn round_capacity(capacity: usize) -> Result<usize, TransportError> {
    if capacity == 0 {
        return Err(TransportError::ZeroCapacity);
    }
    Ok(capacity.next_power_of_two())
}

struct Shared<T> {
    segment: ShmSegment,
    slots: usize,
    mask: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ShmRecord> Shared<T> {
    fn new(segment: ShmSegment, slots: usize) -> Self {
        debug_assert!(slots.is_power_of_two());
        debug_assert!(segment.len() >= segment_len::<T>(slots));
        Self {
            segment,
            slots,
            mask: slots as u64 - 1,
            _marker: PhantomData,
        }
    }

    fn head(&self) -> &AtomicI64 {
        // SAFETY: the header sits at the page-aligned base of a segment that
        // outlives `self`.
        unsafe { &*self.segment.base().cast::<AtomicI64>() }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot(&self, seq: u64) -> *mut u8 {
        let idx = (seq & self.mask) as usize;
        // SAFETY: idx < slots, and the segment holds `slots` elements after
        // the header.
        unsafe {
            self.segment
                .base()
                .add(HEADER_SIZE + idx * elem_size::<T>())
        }
    }

    fn seq_no(&self, slot: *mut u8) -> &AtomicU64 {
        // SAFETY: slot sizes are multiples of 8 and start at offset 8 of a
        // page-aligned mapping, so the tag is 8-byte aligned.
        unsafe { &*slot.add(offset_of!(QueueElem<T>, seq_no)).cast::<AtomicU64>() }
    }

    fn enqueue(&self, value: &T) -> u64 {
        let seq = self.head().fetch_add(1, Ordering::AcqRel) as u64;
        let slot = self.slot(seq);
        // SAFETY: the slot was reserved by the fetch_add above; the payload
        // may be under-aligned at offset 8 so the copy is unaligned.
        unsafe { ptr::write_unaligned(slot.cast::<T>(), *value) };
        self.seq_no(slot).store(seq, Ordering::Release);
        seq
    }
}

/// Queue handle that owns the single reader cursor
///
/// Every handle may enqueue. Only one handle per segment should dequeue;
/// extra writers are obtained through [`MwmrQueue::writer`] or by opening
/// the same key from another process.
pub struct MwmrQueue<T: ShmRecord> {
    shared: Arc<Shared<T>>,
    tail: u64,
}

impl<T: ShmRecord> MwmrQueue<T> {
    /// Allocate and zero the segment for `key`, head set to 1
    pub fn create_on(
        backend: &SegmentBackend,
        key: u32,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let slots = round_capacity(capacity)?;
        let segment = backend.create(key, segment_len::<T>(slots))?;
        Ok(Self::init(segment, slots))
    }

    /// Attach to an existing queue; reading starts at the current head
    pub fn open_on(
        backend: &SegmentBackend,
        key: u32,
        capacity: usize,
    ) -> Result<Self, TransportError> {
        let slots = round_capacity(capacity)?;
        let segment = backend.open(key, segment_len::<T>(slots))?;
        let shared = Arc::new(Shared::new(segment, slots));
        let tail = shared.head().load(Ordering::Acquire) as u64;
        debug!(key, slots, tail, "opened queue");
        Ok(Self { shared, tail })
    }

    /// [`MwmrQueue::create_on`] with a file segment under `dir`
    pub fn create(dir: &Path, key: u32, capacity: usize) -> Result<Self, TransportError> {
        Self::create_on(&SegmentBackend::File(dir.to_path_buf()), key, capacity)
    }

    /// [`MwmrQueue::open_on`] with a file segment under `dir`
    pub fn open(dir: &Path, key: u32, capacity: usize) -> Result<Self, TransportError> {
        Self::open_on(&SegmentBackend::File(dir.to_path_buf()), key, capacity)
    }

    /// Destroy the underlying keyed segment, see [`ShmSegment::remove`]
    pub fn remove(&self) -> Result<(), TransportError> {
        self.shared.segment.remove()
    }

    /// Queue in process-private memory
    pub fn anonymous(capacity: usize) -> Result<Self, TransportError> {
        let slots = round_capacity(capacity)?;
        let segment = ShmSegment::anonymous(segment_len::<T>(slots))?;
        Ok(Self::init(segment, slots))
    }

    fn init(segment: ShmSegment, slots: usize) -> Self {
        let shared = Arc::new(Shared::new(segment, slots));
        shared.head().store(1, Ordering::Release);
        debug!(slots, elem = elem_size::<T>(), "initialised queue");
        Self { shared, tail: 1 }
    }

    /// Append a record; safe from any number of concurrent writers.
    /// Returns the reserved sequence number.
    pub fn enqueue(&self, value: &T) -> u64 {
        self.shared.enqueue(value)
    }

    /// Single poll of the slot at the local tail
    pub fn try_dequeue(&mut self) -> Option<T> {
        let slot = self.shared.slot(self.tail);
        let seq = self.shared.seq_no(slot).load(Ordering::Acquire);
        if seq < self.tail {
            return None;
        }
        // SAFETY: the Acquire load above pairs with the writer's Release
        // store of the tag, so the payload is fully written.
        let value = unsafe { ptr::read_unaligned(slot.cast::<T>()) };
        self.tail = seq + 1;
        Some(value)
    }

    /// Spin until the next record is published
    pub fn dequeue(&mut self) -> T {
        loop {
            if let Some(value) = self.try_dequeue() {
                return value;
            }
            std::hint::spin_loop();
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        let slot = self.shared.slot(self.tail);
        self.shared.seq_no(slot).load(Ordering::Acquire) < self.tail
    }

    /// Slot count after rounding to a power of two
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.slots
    }

    /// Next sequence number a writer will reserve
    #[must_use]
    pub fn head(&self) -> u64 {
        self.shared.head().load(Ordering::Acquire) as u64
    }

    /// Next sequence number this reader expects
    #[must_use]
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Enqueue-only handle sharing this segment
    #[must_use]
    pub fn writer(&self) -> QueueWriter<T> {
        QueueWriter {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Cloneable enqueue-only handle, usable from any thread
pub struct QueueWriter<T: ShmRecord> {
    shared: Arc<Shared<T>>,
}

impl<T: ShmRecord> QueueWriter<T> {
    pub fn enqueue(&self, value: &T) -> u64 {
        self.shared.enqueue(value)
    }
}

impl<T: ShmRecord> Clone for QueueWriter<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}
