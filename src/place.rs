//! Chunk Placement (C4): the callback bridge that maps a heap's item
//! pointers onto a `(chunk_id, heap_index, heap_offset)` destination.
//!
//! The callback is invoked exactly once per heap_cnt, before any payload
//! bytes are copied for that heap (§4.3, §5). It is pure with respect to its
//! inputs and must not retain borrowed request memory past the call, so
//! both disciplines below take `&PlaceRequest`/`&[PlaceRequest]` rather than
//! an owned value.

use crate::packet::Packet;

/// Sentinel `chunk_id` meaning "reject this heap".
pub const REJECT: i64 = -1;

/// Input to the placement callback: the subset of item pointer values the
/// stream was configured to expose (`ChunkStreamConfig::items`), plus the
/// payload size carried by the heap's first packet.
#[derive(Debug, Clone)]
pub struct PlaceRequest {
    /// Values of `ChunkStreamConfig::items`, in the same order, `0` if a
    /// requested item was absent from the heap's first packet.
    pub item_values: Vec<u64>,
    /// `payload_length` from the packet that triggered placement.
    pub payload_size: usize,
    /// Opaque bytes passed through from the triggering packet's extra item
    /// pointers, for callbacks that need more than `items` selects.
    pub extra: Vec<u64>,
}

/// Output of the placement callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceResponse {
    /// Destination chunk, or [`REJECT`] to drop the heap.
    pub chunk_id: i64,
    /// Index of the heap's slot within the chunk.
    pub heap_index: i64,
    /// Byte offset of the heap's slot within `chunk.data`.
    pub heap_offset: i64,
}

impl PlaceResponse {
    pub const fn reject() -> Self {
        PlaceResponse {
            chunk_id: REJECT,
            heap_index: 0,
            heap_offset: 0,
        }
    }

    #[inline]
    pub fn is_rejected(&self) -> bool {
        self.chunk_id == REJECT
    }
}

/// Builds the `item_values` for `items` out of a decoded packet's standard
/// and non-standard item pointers.
pub fn gather_item_values(packet: &Packet<'_>, items: &[u64]) -> Vec<u64> {
    use crate::item::{HEAP_CNT_ID, HEAP_LENGTH_ID, PAYLOAD_LENGTH_ID, PAYLOAD_OFFSET_ID};

    items
        .iter()
        .map(|&id| match id {
            HEAP_CNT_ID => packet.heap_cnt,
            HEAP_LENGTH_ID => packet.heap_length,
            PAYLOAD_OFFSET_ID => packet.payload_offset,
            PAYLOAD_LENGTH_ID => packet.payload_length,
            other => packet
                .item_pointers
                .iter()
                .find(|ptr| ptr.id == other)
                .map(|ptr| ptr.value)
                .unwrap_or(0),
        })
        .collect()
}

/// The two invocation disciplines named in §4.3. Per-heap is the default;
/// Batched amortizes a fixed per-call cost (relevant to a scripting-host
/// boundary this crate doesn't itself cross, but which callers embedding
/// this engine behind such a boundary need to be able to select).
pub enum PlaceDiscipline {
    PerHeap(Box<dyn Fn(&PlaceRequest) -> PlaceResponse + Send + Sync>),
    Batched(Box<dyn Fn(&[PlaceRequest], &mut [PlaceResponse]) + Send + Sync>),
}

impl PlaceDiscipline {
    /// Resolves a single request regardless of discipline. For `Batched`,
    /// this invokes the batch callback with a length-1 batch; real batching
    /// across multiple heap heads is the stream's responsibility (it calls
    /// [`PlaceDiscipline::place_many`] directly when it has accumulated one).
    pub fn place_one(&self, request: &PlaceRequest) -> PlaceResponse {
        match self {
            PlaceDiscipline::PerHeap(f) => f(request),
            PlaceDiscipline::Batched(f) => {
                let mut out = [PlaceResponse::reject()];
                f(std::slice::from_ref(request), &mut out);
                out[0]
            }
        }
    }

    /// Resolves a batch of requests in one call where the discipline
    /// supports it; falls back to one call per request for `PerHeap`.
    pub fn place_many(&self, requests: &[PlaceRequest], out: &mut [PlaceResponse]) {
        debug_assert_eq!(requests.len(), out.len());
        match self {
            PlaceDiscipline::PerHeap(f) => {
                for (req, slot) in requests.iter().zip(out.iter_mut()) {
                    *slot = f(req);
                }
            }
            PlaceDiscipline::Batched(f) => f(requests, out),
        }
    }
}

/// Configuration for a single [`crate::stream::Stream`]'s placement and
/// live-heap tracking.
pub struct ChunkStreamConfig {
    /// Item IDs whose values are surfaced to the placement callback.
    pub items: Vec<u64>,
    /// Width of the chunk window a lone (group-less) stream would use.
    pub max_chunks: u32,
    /// The placement callback.
    pub place: PlaceDiscipline,
    /// Capacity of the per-stream live-heap table.
    pub max_heaps: usize,
}

impl ChunkStreamConfig {
    pub fn new(items: Vec<u64>, max_chunks: u32, place: PlaceDiscipline) -> Self {
        ChunkStreamConfig {
            items,
            max_chunks,
            place,
            max_heaps: 4,
        }
    }

    pub fn with_max_heaps(mut self, max_heaps: usize) -> Self {
        self.max_heaps = max_heaps;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::HEAP_CNT_ID;
    use crate::packet::encode;

    #[test]
    fn gathers_standard_and_extra_items() {
        let bytes = encode(7, 64, 0, 64, &[], None, &[0u8; 64], 40);
        let packet = Packet::decode(&bytes, 40).unwrap();
        let values = gather_item_values(&packet, &[HEAP_CNT_ID]);
        assert_eq!(values, vec![7]);
    }

    #[test]
    fn reject_sentinel_round_trips() {
        let resp = PlaceResponse::reject();
        assert!(resp.is_rejected());
        assert_eq!(resp.chunk_id, REJECT);
    }

    #[test]
    fn per_heap_discipline_invokes_closure() {
        let discipline = PlaceDiscipline::PerHeap(Box::new(|req: &PlaceRequest| PlaceResponse {
            chunk_id: (req.item_values[0] / 64) as i64,
            heap_index: (req.item_values[0] % 64) as i64,
            heap_offset: 0,
        }));
        let req = PlaceRequest {
            item_values: vec![130],
            payload_size: 64,
            extra: vec![],
        };
        let resp = discipline.place_one(&req);
        assert_eq!(resp.chunk_id, 2);
        assert_eq!(resp.heap_index, 2);
    }

    #[test]
    fn batched_discipline_fills_whole_batch() {
        let discipline = PlaceDiscipline::Batched(Box::new(|reqs, out| {
            for (req, slot) in reqs.iter().zip(out.iter_mut()) {
                *slot = PlaceResponse {
                    chunk_id: (req.item_values[0] / 64) as i64,
                    heap_index: (req.item_values[0] % 64) as i64,
                    heap_offset: 0,
                };
            }
        }));
        let reqs = vec![
            PlaceRequest {
                item_values: vec![0],
                payload_size: 64,
                extra: vec![],
            },
            PlaceRequest {
                item_values: vec![65],
                payload_size: 64,
                extra: vec![],
            },
        ];
        let mut out = [PlaceResponse::reject(); 2];
        discipline.place_many(&reqs, &mut out);
        assert_eq!(out[0].chunk_id, 0);
        assert_eq!(out[1].chunk_id, 1);
    }
}
