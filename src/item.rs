//! SPEAD item pointers.
//!
//! An item pointer is a single 64-bit big-endian word: the top bit selects
//! *immediate* (value carried inline) vs *address* (value is an offset into
//! the payload) mode, the next `63 - heap_address_bits` bits carry the item
//! ID, and the low `heap_address_bits` bits carry the value. Widths are
//! configurable per stream (`heap_address_bits`, default 40).

/// Heap-counter item ID.
pub const HEAP_CNT_ID: u64 = 0x1;
/// Total heap length in bytes.
pub const HEAP_LENGTH_ID: u64 = 0x2;
/// Offset of this packet's payload within the heap.
pub const PAYLOAD_OFFSET_ID: u64 = 0x3;
/// Length of this packet's payload.
pub const PAYLOAD_LENGTH_ID: u64 = 0x4;
/// Item descriptor (name/type/shape metadata), not interpreted by this crate.
pub const DESCRIPTOR_ID: u64 = 0x5;
/// Stream control item; value `2` marks end-of-stream.
pub const STREAM_CTRL_ID: u64 = 0x6;
/// Value of `STREAM_CTRL` that marks the end of a heap stream.
pub const STREAM_CTRL_STOP: u64 = 2;
/// Address pointer to the payload within the packet (implicit, never parsed as an item).
pub const PAYLOAD_ID: u64 = 0x3FFF;

/// Default width of the value/address field, in bits.
pub const DEFAULT_HEAP_ADDRESS_BITS: u32 = 40;

/// One decoded 64-bit item pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemPointer {
    pub is_immediate: bool,
    pub id: u64,
    pub value: u64,
}

impl ItemPointer {
    /// Decodes a raw big-endian 64-bit word using the stream's address width.
    #[inline]
    pub fn decode(raw: u64, heap_address_bits: u32) -> Self {
        let is_immediate = raw & (1 << 63) != 0;
        let value_mask = (1u64 << heap_address_bits) - 1;
        let id = (raw >> heap_address_bits) & ((1u64 << (63 - heap_address_bits)) - 1);
        let value = raw & value_mask;
        ItemPointer {
            is_immediate,
            id,
            value,
        }
    }

    /// Encodes back into a raw 64-bit word. Used only by the test-only encoder
    /// (round-trip property 5 in the design's testable properties).
    #[inline]
    pub fn encode(&self, heap_address_bits: u32) -> u64 {
        let mode_bit = if self.is_immediate { 1u64 << 63 } else { 0 };
        (mode_bit) | (self.id << heap_address_bits) | (self.value & ((1u64 << heap_address_bits) - 1))
    }
}
