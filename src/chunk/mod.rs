//! Chunk storage: allocator abstraction (C3/§6), the `Chunk` container
//! (§3), and the sliding window that addresses chunks by id (§4.4).

mod allocator;
mod chunk;
mod window;

pub use allocator::{AllocatedBuffer, AllocatorIface, HeapAllocator, MmapAllocator};
pub use chunk::Chunk;
pub use window::{ChunkWindow, WindowLookup};
