//! The `Chunk` type (§3): a fixed-size, consumer-visible container holding
//! a contiguous range of heaps.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};

use super::allocator::AllocatedBuffer;

/// A chunk owned exclusively by whichever actor currently holds it (the
/// group while in-window, the consumer after a data-ring pop, the group
/// again once recycled off the free-ring) — see §9's ownership model.
///
/// While in the group's window, `data` may be written concurrently by
/// every stream in the group: each stream writes only the byte ranges its
/// own placed heaps own, a disjointness the placement function is
/// responsible for upholding (§4.6). That is the one place this type
/// allows unsynchronized concurrent mutation; everywhere else a chunk has
/// a single owner and ordinary `&mut` access applies.
pub struct Chunk {
    pub chunk_id: i64,
    data: UnsafeCell<AllocatedBuffer>,
    present: Box<[AtomicU8]>,
    extra: Option<UnsafeCell<AllocatedBuffer>>,
    pub user_handle: Option<u64>,
}

// SAFETY: concurrent access to `data` is restricted to disjoint byte ranges
// by the placement contract (§4.6); `present` is itself atomic.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    pub fn new(chunk_id: i64, data: AllocatedBuffer, heaps_per_chunk: usize) -> Self {
        Chunk {
            chunk_id,
            data: UnsafeCell::new(data),
            present: (0..heaps_per_chunk).map(|_| AtomicU8::new(0)).collect(),
            extra: None,
            user_handle: None,
        }
    }

    pub fn with_extra(mut self, extra: AllocatedBuffer) -> Self {
        self.extra = Some(UnsafeCell::new(extra));
        self
    }

    #[inline]
    pub fn data_len(&self) -> usize {
        unsafe { (*self.data.get()).len() }
    }

    #[inline]
    pub fn present_len(&self) -> usize {
        self.present.len()
    }

    /// Writes `bytes` into `data[offset..offset + bytes.len()]`.
    ///
    /// # Safety
    /// The caller must guarantee no other thread is concurrently writing an
    /// overlapping byte range of this same chunk. The placement function is
    /// the enforcement point: distinct `(chunk_id, heap_index)` slots chosen
    /// by different heaps must map to disjoint offsets (§4.6).
    pub unsafe fn write_payload(&self, offset: usize, bytes: &[u8]) {
        let data = &mut *self.data.get();
        data.as_mut_slice()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Marks `heap_index` present with release ordering, so a reader that
    /// observes the flag with acquire ordering also observes the payload
    /// bytes this call's preceding `write_payload` wrote (§5).
    pub fn mark_present(&self, heap_index: usize) {
        self.present[heap_index].store(1, Ordering::Release);
    }

    pub fn is_present(&self, heap_index: usize) -> bool {
        self.present[heap_index].load(Ordering::Acquire) != 0
    }

    pub fn present_count(&self) -> usize {
        self.present
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire) != 0)
            .count()
    }

    /// Safe read access. Valid whenever the caller is the chunk's sole
    /// current owner (after a data-ring pop, or before the chunk has
    /// entered any window).
    pub fn data(&self) -> &[u8] {
        unsafe { (*self.data.get()).as_slice() }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.data.get_mut().as_mut_slice()
    }

    pub fn extra(&self) -> Option<&[u8]> {
        self.extra.as_ref().map(|cell| unsafe { (*cell.get()).as_slice() })
    }

    pub fn extra_mut(&mut self) -> Option<&mut [u8]> {
        self.extra.as_mut().map(|cell| cell.get_mut().as_mut_slice())
    }

    /// Re-tags a recycled chunk with a new ID and clears its present bits.
    /// Only called while this is the sole owner (just pulled off the
    /// free-ring, before being published into a window).
    pub fn reset(&mut self, chunk_id: i64) {
        self.chunk_id = chunk_id;
        for flag in self.present.iter() {
            flag.store(0, Ordering::Relaxed);
        }
    }
}
