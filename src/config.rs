//! Configuration options.
//!
//! Runtime-facing options that are plain data (wire parameters, window
//! sizing, eviction policy, the default UDP source's socket settings) are
//! `serde`-derived so they can be loaded from a TOML file the way the
//! teacher loads its `RuntimeConfig`. The placement callback itself is not
//! data and is never part of a serialized config; it is supplied
//! programmatically via [`crate::place::PlaceDiscipline`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::item::DEFAULT_HEAP_ADDRESS_BITS;

/// Loads a [`RuntimeConfig`] from a TOML file.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<RuntimeConfig> {
    let text = fs::read_to_string(path)?;
    let config: RuntimeConfig = toml::from_str(&text)?;
    Ok(config)
}

/// Per-stream wire and reassembly parameters.
///
/// One `StreamConfig` is shared by every [`crate::stream::Stream`] in a
/// group; `heap_address_bits` must be identical across all streams sharing
/// a group (it is a wire-format parameter, not a per-stream tuning knob).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Width, in bits, of the address/value field of an item pointer.
    #[serde(default = "default_heap_address_bits")]
    pub heap_address_bits: u32,

    /// Number of in-flight `LiveHeap`s tracked per stream before the oldest
    /// is evicted.
    #[serde(default = "default_max_heaps")]
    pub max_heaps: usize,

    /// Bounded batch size used for placement batching (see
    /// [`crate::place::PlaceDiscipline::Batched`]); ignored for `PerHeap`.
    #[serde(default = "default_place_batch_size")]
    pub place_batch_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            heap_address_bits: default_heap_address_bits(),
            max_heaps: default_max_heaps(),
            place_batch_size: default_place_batch_size(),
        }
    }
}

fn default_heap_address_bits() -> u32 {
    DEFAULT_HEAP_ADDRESS_BITS
}

fn default_max_heaps() -> usize {
    4
}

fn default_place_batch_size() -> usize {
    16
}

/// Governs what happens when ingest needs a chunk_id outside the window and
/// the free-ring has nothing to hand out immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionMode {
    /// Drop the too-new heap and increment `too_new_heaps` rather than block.
    Lossy,
    /// Block the ingesting stream until a chunk is returned to the free-ring.
    Lossless,
}

impl Default for EvictionMode {
    fn default() -> Self {
        EvictionMode::Lossy
    }
}

/// Settings shared by an entire [`crate::group::ChunkStreamGroup`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkStreamGroupConfig {
    /// Width `W` of the sliding chunk-id window.
    pub max_chunks: u32,

    /// What to do when ingest targets a chunk past the window.
    #[serde(default)]
    pub eviction_mode: EvictionMode,
}

impl ChunkStreamGroupConfig {
    pub fn new(max_chunks: u32) -> Self {
        ChunkStreamGroupConfig {
            max_chunks,
            eviction_mode: EvictionMode::default(),
        }
    }
}

/// Socket settings for the default [`crate::source::UdpDatagramSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpSourceConfig {
    /// Local address to bind, e.g. `"0.0.0.0:8888"`.
    pub bind_addr: String,

    /// OS socket receive buffer size in bytes. Defaults to 1 MiB.
    #[serde(default = "default_socket_buffer_size")]
    pub socket_buffer_size: usize,

    /// Optional multicast group to join (the interface to bind is implied
    /// by `bind_addr`).
    #[serde(default)]
    pub multicast_group: Option<String>,
}

fn default_socket_buffer_size() -> usize {
    1024 * 1024
}

/// Top-level configuration combining the pieces above. Not every
/// application needs every field populated from a file; constructing the
/// individual structs directly is equally supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub stream: StreamConfig,
    pub group: ChunkStreamGroupConfig,
    pub sources: Vec<UdpSourceConfig>,
}
