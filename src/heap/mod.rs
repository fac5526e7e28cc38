//! Heap reassembly state: a single [`LiveHeap`] and the per-stream
//! [`LiveHeapTable`] that owns a bounded set of them.

mod live;
mod table;

pub use live::{BufferedPacket, LiveHeap, PlacementState};
pub use table::LiveHeapTable;
