//! A receive-side reassembly engine for the SPEAD (Streaming Protocol for
//! Exchange of Astronomical Data) wire protocol.
//!
//! This crate consumes a flood of out-of-order UDP datagrams, decodes
//! SPEAD framing, reconstructs heaps incrementally into caller-provided
//! memory, and coalesces heaps from multiple parallel receiving streams
//! into aligned chunks delivered through a back-pressured ring. It does
//! not implement the send side, the TCP/in-process/UDP-IBV transports, or
//! a thread-pool primitive; those are named interfaces
//! ([`AllocatorIface`], [`Executor`], [`DatagramSource`]) a caller
//! supplies or accepts this crate's defaults for.
//!
//! A minimal single-stream setup:
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spead_recv_core::chunk::{ChunkStreamGroup, HeapAllocator};
//! use spead_recv_core::config::{ChunkStreamGroupConfig, StreamConfig, UdpSourceConfig};
//! use spead_recv_core::item::HEAP_CNT_ID;
//! use spead_recv_core::place::{ChunkStreamConfig, PlaceDiscipline, PlaceResponse};
//! use spead_recv_core::source::UdpDatagramSource;
//! use spead_recv_core::stream::Stream;
//!
//! let group_config = ChunkStreamGroupConfig::new(4);
//! let group = Arc::new(
//!     ChunkStreamGroup::new(&group_config, &HeapAllocator, 64, 65536).unwrap(),
//! );
//!
//! let place = PlaceDiscipline::PerHeap(Box::new(|req| PlaceResponse {
//!     chunk_id: (req.item_values[0] / 64) as i64,
//!     heap_index: (req.item_values[0] % 64) as i64,
//!     heap_offset: 0,
//! }));
//! let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 4, place);
//!
//! let stream = Stream::new(StreamConfig::default(), place_config, Arc::clone(&group));
//! let handle = stream.handle();
//!
//! let source_config = UdpSourceConfig {
//!     bind_addr: "0.0.0.0:8888".to_string(),
//!     socket_buffer_size: 1024 * 1024,
//!     multicast_group: None,
//! };
//! let source = UdpDatagramSource::bind(&source_config).unwrap();
//!
//! // Normally spawned via `Executor::spawn` rather than run inline.
//! // stream.run(source);
//! # let _ = (handle, source);
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod executor;
pub mod group;
pub mod heap;
pub mod item;
pub mod packet;
pub mod place;
pub mod ring;
pub mod source;
pub mod stats;
pub mod stream;

pub use chunk::{AllocatedBuffer, AllocatorIface, Chunk, ChunkWindow, HeapAllocator, MmapAllocator, WindowLookup};
pub use config::{load_config, ChunkStreamGroupConfig, EvictionMode, RuntimeConfig, StreamConfig, UdpSourceConfig};
pub use error::{PacketParseError, RecvError};
pub use executor::{Executor, ThreadExecutor};
pub use group::{ChunkStreamGroup, ResolveOutcome};
pub use heap::{BufferedPacket, LiveHeap, LiveHeapTable, PlacementState};
pub use item::ItemPointer;
pub use packet::Packet;
pub use place::{ChunkStreamConfig, PlaceDiscipline, PlaceRequest, PlaceResponse};
pub use ring::Ringbuffer;
pub use source::{DatagramSource, UdpDatagramSource};
pub use stats::{GroupStats, GroupStatsSnapshot, StreamStats, StreamStatsSnapshot};
pub use stream::{Stream, StreamHandle, StreamState};
