//! Packet Decoder (C1): parses one datagram into a header plus item pointers
//! and a borrowed payload slice.
//!
//! Decoding never copies payload bytes; the returned [`Packet`] borrows
//! `bytes` for its entire lifetime, mirroring the teacher's packet types
//! borrowing their backing buffer.

use byteorder::{BigEndian, ByteOrder};

use crate::error::PacketParseError;
use crate::item::{
    ItemPointer, DESCRIPTOR_ID, HEAP_CNT_ID, HEAP_LENGTH_ID, PAYLOAD_LENGTH_ID, PAYLOAD_OFFSET_ID,
    STREAM_CTRL_ID,
};

const HEADER_LEN: usize = 8;
const MAGIC: u8 = 0x53;
const VERSION: u8 = 0x04;

/// A single decoded SPEAD datagram.
///
/// `item_pointers` holds every non-standard item pointer verbatim (in wire
/// order), for the placement callback to consult. The four standard fields
/// are pulled out into dedicated members.
#[derive(Debug)]
pub struct Packet<'a> {
    pub heap_cnt: u64,
    pub heap_length: u64,
    pub payload_offset: u64,
    pub payload_length: u64,
    pub stream_ctrl: Option<u64>,
    pub item_pointers: Vec<ItemPointer>,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Decodes `bytes` against a stream configured with `heap_address_bits`.
    pub fn decode(bytes: &'a [u8], heap_address_bits: u32) -> Result<Self, PacketParseError> {
        if bytes.len() < HEADER_LEN {
            return Err(PacketParseError::Truncated);
        }
        if bytes[0] != MAGIC {
            return Err(PacketParseError::BadMagic);
        }
        if bytes[1] != VERSION {
            return Err(PacketParseError::BadVersion);
        }

        let reserved = bytes[2];
        let expected_reserved = ((64 - heap_address_bits) / 8) as u8;
        if reserved != 0 && reserved != expected_reserved {
            return Err(PacketParseError::PointerWidthMismatch);
        }
        let header_hab = bytes[3] as u32 * 8;
        if header_hab != heap_address_bits {
            return Err(PacketParseError::PointerWidthMismatch);
        }

        let n_items = BigEndian::read_u16(&bytes[6..8]) as usize;
        let items_end = HEADER_LEN + n_items * 8;
        if bytes.len() < items_end {
            return Err(PacketParseError::Truncated);
        }

        let mut heap_cnt = 0u64;
        let mut heap_length = 0u64;
        let mut payload_offset = 0u64;
        let mut payload_length = 0u64;
        let mut stream_ctrl = None;
        let mut item_pointers = Vec::with_capacity(n_items);

        for i in 0..n_items {
            let raw = BigEndian::read_u64(&bytes[HEADER_LEN + i * 8..HEADER_LEN + i * 8 + 8]);
            let ptr = ItemPointer::decode(raw, heap_address_bits);
            match ptr.id {
                HEAP_CNT_ID => heap_cnt = ptr.value,
                HEAP_LENGTH_ID => heap_length = ptr.value,
                PAYLOAD_OFFSET_ID => payload_offset = ptr.value,
                PAYLOAD_LENGTH_ID => payload_length = ptr.value,
                STREAM_CTRL_ID => stream_ctrl = Some(ptr.value),
                DESCRIPTOR_ID => item_pointers.push(ptr),
                _ => item_pointers.push(ptr),
            }
        }

        Ok(Packet {
            heap_cnt,
            heap_length,
            payload_offset,
            payload_length,
            stream_ctrl,
            item_pointers,
            payload: &bytes[items_end..],
        })
    }

    /// Returns `true` if `payload_offset + payload_length <= heap_length`, the
    /// framing invariant from §3. Packets that fail this check are discarded
    /// by the caller with a counter increment, not by `decode` itself.
    #[inline]
    pub fn framing_is_valid(&self) -> bool {
        self.payload_offset
            .checked_add(self.payload_length)
            .is_some_and(|end| end <= self.heap_length)
    }

    /// `true` if this packet carries `STREAM_CTRL = 2` (end-of-stream).
    #[inline]
    pub fn is_stop(&self) -> bool {
        self.stream_ctrl == Some(crate::item::STREAM_CTRL_STOP)
    }
}

/// Builds a synthetic datagram from a [`Packet`]'s fields. Used only by
/// tests to exercise the `encode(decode(p)) == p` round-trip property and to
/// synthesize datagrams for the scenario tests, never by production code.
#[cfg(any(test, feature = "testing"))]
pub fn encode(
    heap_cnt: u64,
    heap_length: u64,
    payload_offset: u64,
    payload_length: u64,
    extra_items: &[ItemPointer],
    stream_ctrl: Option<u64>,
    payload: &[u8],
    heap_address_bits: u32,
) -> Vec<u8> {
    use crate::item::{ItemPointer as Ip, PAYLOAD_ID};

    let mut standard = vec![
        Ip {
            is_immediate: true,
            id: HEAP_CNT_ID,
            value: heap_cnt,
        },
        Ip {
            is_immediate: true,
            id: HEAP_LENGTH_ID,
            value: heap_length,
        },
        Ip {
            is_immediate: true,
            id: PAYLOAD_OFFSET_ID,
            value: payload_offset,
        },
        Ip {
            is_immediate: true,
            id: PAYLOAD_LENGTH_ID,
            value: payload_length,
        },
    ];
    if let Some(ctrl) = stream_ctrl {
        standard.push(Ip {
            is_immediate: true,
            id: STREAM_CTRL_ID,
            value: ctrl,
        });
    }
    standard.extend_from_slice(extra_items);
    standard.push(Ip {
        is_immediate: false,
        id: PAYLOAD_ID,
        value: 0,
    });

    let n_items = standard.len();
    let mut out = Vec::with_capacity(HEADER_LEN + n_items * 8 + payload.len());
    out.push(MAGIC);
    out.push(VERSION);
    out.push(0); // reserved
    out.push((heap_address_bits / 8) as u8);
    out.extend_from_slice(&[0, 0]); // reserved
    let mut n_items_be = [0u8; 2];
    BigEndian::write_u16(&mut n_items_be, n_items as u16);
    out.extend_from_slice(&n_items_be);
    for ptr in &standard {
        let mut raw_be = [0u8; 8];
        BigEndian::write_u64(&mut raw_be, ptr.encode(heap_address_bits));
        out.extend_from_slice(&raw_be);
    }
    out.extend_from_slice(payload);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = encode(1, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40);
        bytes[0] = 0xFF;
        assert_eq!(
            Packet::decode(&bytes, 40).unwrap_err(),
            PacketParseError::BadMagic
        );
    }

    #[test]
    fn rejects_bad_version() {
        let mut bytes = encode(1, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40);
        bytes[1] = 0x01;
        assert_eq!(
            Packet::decode(&bytes, 40).unwrap_err(),
            PacketParseError::BadVersion
        );
    }

    #[test]
    fn rejects_truncated() {
        let bytes = encode(1, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40);
        let truncated = &bytes[..bytes.len() - 2];
        assert_eq!(
            Packet::decode(truncated, 40).unwrap_err(),
            PacketParseError::Truncated
        );
    }

    #[test]
    fn rejects_pointer_width_mismatch() {
        let bytes = encode(1, 4, 0, 4, &[], None, &[1, 2, 3, 4], 48);
        assert_eq!(
            Packet::decode(&bytes, 40).unwrap_err(),
            PacketParseError::PointerWidthMismatch
        );
    }

    #[test]
    fn round_trip_well_formed_packet() {
        let payload = vec![9u8; 64];
        let bytes = encode(42, 64, 0, 64, &[], None, &payload, 40);
        let decoded = Packet::decode(&bytes, 40).unwrap();
        assert_eq!(decoded.heap_cnt, 42);
        assert_eq!(decoded.heap_length, 64);
        assert_eq!(decoded.payload_offset, 0);
        assert_eq!(decoded.payload_length, 64);
        assert_eq!(decoded.payload, &payload[..]);
        assert!(decoded.framing_is_valid());
        assert!(!decoded.is_stop());
    }

    #[test]
    fn detects_stop_control() {
        let bytes = encode(0, 0, 0, 0, &[], Some(2), &[], 40);
        let decoded = Packet::decode(&bytes, 40).unwrap();
        assert!(decoded.is_stop());
    }

    #[test]
    fn detects_framing_violation() {
        let payload = vec![1u8; 4];
        let bytes = encode(1, 4, 4, 4, &[], None, &payload, 40);
        let decoded = Packet::decode(&bytes, 40).unwrap();
        assert!(!decoded.framing_is_valid());
    }
}
