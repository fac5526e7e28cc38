//! Live-Heap Table (C2): tracks partially-received heaps per stream,
//! evicting the oldest entry under pressure.
//!
//! Structured after the teacher's `ConnTracker`: an insertion-ordered map
//! sized to a small fixed capacity, with O(1) "oldest" eviction and no
//! timer wheel (a live heap has no activity timeout of its own — eviction
//! is purely pressure-driven, §4.2).

use hashlink::LinkedHashMap;

use super::live::LiveHeap;

/// Tracks in-progress heaps for one stream, keyed by `heap_cnt`.
pub struct LiveHeapTable {
    max_heaps: usize,
    table: LinkedHashMap<u64, LiveHeap>,
}

impl LiveHeapTable {
    pub fn new(max_heaps: usize) -> Self {
        LiveHeapTable {
            max_heaps: max_heaps.max(1),
            table: LinkedHashMap::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.max_heaps
    }

    pub fn get_mut(&mut self, heap_cnt: u64) -> Option<&mut LiveHeap> {
        self.table.get_mut(&heap_cnt)
    }

    /// Returns the entry for `heap_cnt`, inserting a fresh one (with
    /// `heap_length`) if this is the first packet seen for it. When at
    /// capacity, evicts the oldest entry first and returns it so the
    /// caller can report its final state to the owning chunk (§4.2 step 3).
    ///
    /// Returns `(heap, is_new, evicted)`.
    pub fn get_or_insert(
        &mut self,
        heap_cnt: u64,
        heap_length: u64,
    ) -> (&mut LiveHeap, bool, Option<LiveHeap>) {
        if self.table.contains_key(&heap_cnt) {
            return (self.table.get_mut(&heap_cnt).unwrap(), false, None);
        }

        let mut evicted = None;
        if self.table.len() >= self.max_heaps {
            if let Some((&oldest_id, _)) = self.table.iter().next() {
                evicted = self.table.remove(&oldest_id);
            }
        }

        self.table.insert(heap_cnt, LiveHeap::new(heap_cnt, heap_length));
        (self.table.get_mut(&heap_cnt).unwrap(), true, evicted)
    }

    /// Removes and returns a completed or rejected heap's entry.
    pub fn remove(&mut self, heap_cnt: u64) -> Option<LiveHeap> {
        self.table.remove(&heap_cnt)
    }

    /// Drains every remaining entry, oldest first, on stream stop.
    pub fn drain(&mut self) -> Vec<LiveHeap> {
        self.table.drain().map(|(_, heap)| heap).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_fresh_entry_on_first_packet() {
        let mut table = LiveHeapTable::new(4);
        let (heap, is_new, evicted) = table.get_or_insert(1, 1024);
        assert!(is_new);
        assert!(evicted.is_none());
        assert_eq!(heap.heap_cnt, 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn returns_existing_entry_without_reinserting() {
        let mut table = LiveHeapTable::new(4);
        table.get_or_insert(1, 1024).0.received_bytes = 512;
        let (heap, is_new, _) = table.get_or_insert(1, 1024);
        assert!(!is_new);
        assert_eq!(heap.received_bytes, 512);
    }

    #[test]
    fn evicts_oldest_entry_at_capacity() {
        let mut table = LiveHeapTable::new(2);
        table.get_or_insert(1, 64);
        table.get_or_insert(2, 64);
        let (heap, is_new, evicted) = table.get_or_insert(3, 64);
        assert!(is_new);
        assert_eq!(heap.heap_cnt, 3);
        let evicted = evicted.expect("oldest entry should have been evicted");
        assert_eq!(evicted.heap_cnt, 1);
        assert_eq!(table.len(), 2);
        assert!(table.get_mut(2).is_some());
        assert!(table.get_mut(1).is_none());
    }

    #[test]
    fn drain_empties_the_table() {
        let mut table = LiveHeapTable::new(4);
        table.get_or_insert(1, 64);
        table.get_or_insert(2, 64);
        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }
}
