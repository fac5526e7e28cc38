//! A single in-progress heap reassembly.

use crate::place::PlaceResponse;

/// Where a [`LiveHeap`] stands with respect to placement (§4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementState {
    /// Placement has not yet run (no packet has triggered it).
    Pending,
    /// Placement ran and returned a usable `(chunk_id, heap_index, heap_offset)`.
    Placed,
    /// Placement returned [`crate::place::REJECT`]; further packets are dropped cheaply.
    Rejected,
}

/// One packet's payload captured while its heap awaits a batched
/// placement decision (§4.3). The payload is copied because the packet
/// itself borrows a `recv` buffer the stream reuses on its next call.
#[derive(Debug)]
pub struct BufferedPacket {
    pub payload_offset: u64,
    pub payload: Vec<u8>,
}

/// Mutable reassembly state for one `heap_cnt` (§3).
#[derive(Debug)]
pub struct LiveHeap {
    pub heap_cnt: u64,
    pub length: u64,
    pub received_bytes: u64,
    pub state: PlacementState,
    pub chunk_id: i64,
    pub heap_index: i64,
    pub heap_offset: i64,
    /// Packets received while `state == Pending` under a `Batched`
    /// placement discipline, held until the batch flushes.
    pub buffered: Vec<BufferedPacket>,
}

impl LiveHeap {
    /// Creates a fresh, unplaced entry triggered by the first packet seen
    /// for `heap_cnt`.
    pub fn new(heap_cnt: u64, length: u64) -> Self {
        LiveHeap {
            heap_cnt,
            length,
            received_bytes: 0,
            state: PlacementState::Pending,
            chunk_id: -1,
            heap_index: -1,
            heap_offset: -1,
            buffered: Vec::new(),
        }
    }

    /// Records a successful placement decision. Per the open question in
    /// §9, this is only ever called once per heap, on the first packet that
    /// permits resolution.
    pub fn mark_placed(&mut self, response: PlaceResponse) {
        debug_assert!(!response.is_rejected());
        self.chunk_id = response.chunk_id;
        self.heap_index = response.heap_index;
        self.heap_offset = response.heap_offset;
        self.state = PlacementState::Placed;
    }

    pub fn mark_rejected(&mut self) {
        self.state = PlacementState::Rejected;
    }

    #[inline]
    pub fn is_placed(&self) -> bool {
        self.state == PlacementState::Placed
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.state == PlacementState::Rejected
    }

    /// `true` once every byte of the heap's declared length has arrived.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.length > 0 && self.received_bytes >= self.length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_heap_is_pending_and_incomplete() {
        let heap = LiveHeap::new(5, 1024);
        assert_eq!(heap.state, PlacementState::Pending);
        assert!(!heap.is_complete());
    }

    #[test]
    fn mark_placed_records_destination() {
        let mut heap = LiveHeap::new(5, 1024);
        heap.mark_placed(PlaceResponse {
            chunk_id: 3,
            heap_index: 7,
            heap_offset: 128,
        });
        assert!(heap.is_placed());
        assert_eq!(heap.chunk_id, 3);
        assert_eq!(heap.heap_index, 7);
        assert_eq!(heap.heap_offset, 128);
    }

    #[test]
    fn completes_once_all_bytes_received() {
        let mut heap = LiveHeap::new(5, 16);
        heap.received_bytes = 16;
        assert!(heap.is_complete());
    }
}
