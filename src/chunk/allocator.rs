//! Allocator interface (§6): the polymorphic allocator hierarchy itself is
//! out of scope (an external collaborator), but this crate ships two
//! defaults so a caller can run the core without supplying one.
//!
//! Structured after the teacher's `Mempool`/`Mbuf` wrappers: a thin,
//! `Debug`-able handle over externally-managed memory, selected once at
//! stream construction via a trait object rather than an inheritance
//! hierarchy (§9's "Polymorphism over transports and allocators").

use std::fmt;

use crate::error::RecvError;

/// Owning buffer returned by an [`AllocatorIface`]. A closed enum rather
/// than `Box<dyn ...>` because there are exactly two storage strategies and
/// no caller needs to add a third without also adding it here.
pub enum AllocatedBuffer {
    Heap(Box<[u8]>),
    Mmap(memmap2::MmapMut),
}

impl AllocatedBuffer {
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            AllocatedBuffer::Heap(b) => b,
            AllocatedBuffer::Mmap(m) => m,
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            AllocatedBuffer::Heap(b) => b,
            AllocatedBuffer::Mmap(m) => m,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for AllocatedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllocatedBuffer").field("len", &self.len()).finish()
    }
}

/// Capability set `{allocate}` for chunk storage (§9). `free` is implicit:
/// dropping the returned [`AllocatedBuffer`] releases it.
pub trait AllocatorIface: Send + Sync {
    fn allocate(&self, size: usize) -> Result<AllocatedBuffer, RecvError>;
}

/// Plain heap buffer, zeroed at allocation time (which on every mainstream
/// allocator means the backing pages are already fault-in'd, hence
/// "page-fault-prewarmed" in §6).
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl AllocatorIface for HeapAllocator {
    fn allocate(&self, size: usize) -> Result<AllocatedBuffer, RecvError> {
        Ok(AllocatedBuffer::Heap(vec![0u8; size].into_boxed_slice()))
    }
}

/// mmap-backed buffer. `lock` maps to `mlock(2)`, pinning the pages so they
/// are never paged out — useful when packet bursts can't tolerate a page
/// fault mid-copy. Huge-page backing is not exposed: Rust has no portable
/// `MAP_HUGETLB` equivalent, so it is dropped from this port (see DESIGN.md).
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapAllocator {
    pub lock: bool,
}

impl MmapAllocator {
    pub fn new(lock: bool) -> Self {
        MmapAllocator { lock }
    }
}

impl AllocatorIface for MmapAllocator {
    fn allocate(&self, size: usize) -> Result<AllocatedBuffer, RecvError> {
        let mut mmap = memmap2::MmapMut::map_anon(size)
            .map_err(|e| RecvError::AllocatorFailure(e.into()))?;
        mmap.fill(0);
        if self.lock {
            mmap.lock().map_err(|e| RecvError::AllocatorFailure(e.into()))?;
        }
        Ok(AllocatedBuffer::Mmap(mmap))
    }
}
