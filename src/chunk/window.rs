//! The chunk window (§4.4): the slice of the unbounded chunk-id space
//! currently resident in memory for a group, addressed by sliding-head
//! offset.

use std::collections::VecDeque;
use std::sync::Arc;

use super::chunk::Chunk;

/// Result of resolving a `chunk_id` against the current window.
pub enum WindowLookup {
    Found(Arc<Chunk>),
    /// `chunk_id` precedes the window head; it has already been flushed.
    TooOld,
    /// `chunk_id` falls beyond the window's configured width.
    TooNew,
}

/// A sliding, fixed-width deque of chunk slots keyed by chunk id. Callers
/// hold the group mutex while calling into this type (§9): lookups clone
/// the `Arc<Chunk>` handle out before releasing the lock, so the payload
/// writes that follow happen outside the critical section.
pub struct ChunkWindow {
    head_id: i64,
    width: usize,
    slots: VecDeque<Option<Arc<Chunk>>>,
}

impl ChunkWindow {
    pub fn new(width: usize) -> Self {
        ChunkWindow {
            head_id: 0,
            width: width.max(1),
            slots: VecDeque::with_capacity(width.max(1)),
        }
    }

    #[inline]
    pub fn head(&self) -> i64 {
        self.head_id
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Resolves `chunk_id` to its current slot, if any.
    pub fn get(&self, chunk_id: i64) -> WindowLookup {
        if chunk_id < self.head_id {
            return WindowLookup::TooOld;
        }
        let offset = (chunk_id - self.head_id) as usize;
        if offset >= self.width {
            return WindowLookup::TooNew;
        }
        match self.slots.get(offset) {
            Some(Some(chunk)) => WindowLookup::Found(Arc::clone(chunk)),
            _ => WindowLookup::TooNew,
        }
    }

    /// Publishes a freshly-pulled chunk into the next open slot, extending
    /// the window. The caller is responsible for having already tagged
    /// `chunk.chunk_id` to the slot it's meant to occupy (`head_id + len()`).
    pub fn push_back(&mut self, chunk: Arc<Chunk>) {
        debug_assert_eq!(chunk.chunk_id, self.head_id + self.slots.len() as i64);
        self.slots.push_back(Some(chunk));
    }

    /// Slides the head forward by `shift` slots, evicting them from the
    /// window and returning whatever chunks occupied them. `head_id` always
    /// advances by the full `shift`, but only `min(shift, len())` slots
    /// actually exist to pop — a `shift` larger than the current length
    /// (a heap_cnt far ahead of anything resident) just empties the window.
    /// Used both by ordinary forward progress and by a too-new arrival that
    /// forces the window to slide (§4.4).
    pub fn advance_head(&mut self, shift: usize) -> Vec<Option<Arc<Chunk>>> {
        let flush_count = shift.min(self.slots.len());
        let flushed = (0..flush_count).map(|_| self.slots.pop_front().flatten()).collect();
        self.head_id += shift as i64;
        flushed
    }

    /// Drains every resident chunk, used on stream/group stop (§4.7).
    pub fn flush_all(&mut self) -> Vec<Option<Arc<Chunk>>> {
        let drained: Vec<_> = self.slots.drain(..).collect();
        self.head_id += drained.len() as i64;
        drained
    }
}
