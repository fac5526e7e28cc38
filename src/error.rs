//! Error kinds for the receive-side reassembly engine.
//!
//! Per-packet and per-heap outcomes (a malformed datagram, a rejected
//! placement, a chunk_id outside the window) are ordinary branches of the
//! hot path, not errors: they are surfaced as typed return values
//! ([`PacketParseError`] from [`crate::packet::Packet::decode`],
//! [`crate::group::ResolveOutcome`], [`crate::heap::PlacementState`]) and
//! folded into [`crate::stats::StreamStats`] counters by the caller.
//! [`RecvError`] is reserved for the genuinely exceptional failures that
//! stop a stream or a group outright.

use thiserror::Error;

/// Errors produced while decoding a single datagram.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketParseError {
    #[error("bad magic byte")]
    BadMagic,

    #[error("unsupported protocol version")]
    BadVersion,

    #[error("datagram shorter than its declared item pointers")]
    Truncated,

    #[error("item pointer width does not match stream configuration")]
    PointerWidthMismatch,
}

/// Stream- and group-level fatal error kinds.
#[derive(Error, Debug)]
pub enum RecvError {
    /// The datagram source failed in a way that cannot be retried.
    #[error("datagram source failed: {0}")]
    SourceFatal(#[source] anyhow::Error),

    /// A chunk could not be obtained from the allocator.
    #[error("allocator failure: {0}")]
    AllocatorFailure(#[source] anyhow::Error),

    /// The operation was attempted after `stop()`.
    #[error("stopped")]
    Stopped,
}
