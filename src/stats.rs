//! Statistics (§7, ambient observability layer): thread-safe counters kept
//! per stream and aggregated per group, mirroring the teacher's
//! `SubscriptionStats` (atomics updated on the hot path, snapshotted for
//! reporting without blocking producers).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one [`crate::stream::Stream`].
#[derive(Default)]
pub struct StreamStats {
    /// Datagrams that failed §4.1 decode validation.
    pub malformed_packets: AtomicU64,
    /// Datagrams that failed the payload-offset/length framing check.
    pub framing_violations: AtomicU64,
    /// Datagrams successfully decoded and folded into a heap.
    pub packets_processed: AtomicU64,
    /// Heaps for which placement returned [`crate::place::REJECT`].
    pub heaps_rejected: AtomicU64,
    /// Heaps evicted from the live-heap table before completion.
    pub heaps_evicted_incomplete: AtomicU64,
    /// Heaps that reassembled to completion.
    pub heaps_completed: AtomicU64,
    /// Heaps whose placement named a `chunk_id` behind the window head.
    pub too_old_heaps: AtomicU64,
    /// Heaps whose placement named a `chunk_id` beyond the window width.
    pub too_new_heaps: AtomicU64,
    /// Total payload bytes copied into chunk storage.
    pub bytes_received: AtomicU64,
}

impl StreamStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            framing_violations: self.framing_violations.load(Ordering::Relaxed),
            packets_processed: self.packets_processed.load(Ordering::Relaxed),
            heaps_rejected: self.heaps_rejected.load(Ordering::Relaxed),
            heaps_evicted_incomplete: self.heaps_evicted_incomplete.load(Ordering::Relaxed),
            heaps_completed: self.heaps_completed.load(Ordering::Relaxed),
            too_old_heaps: self.too_old_heaps.load(Ordering::Relaxed),
            too_new_heaps: self.too_new_heaps.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A point-in-time, non-atomic copy of [`StreamStats`] suitable for
/// logging or serializing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    pub malformed_packets: u64,
    pub framing_violations: u64,
    pub packets_processed: u64,
    pub heaps_rejected: u64,
    pub heaps_evicted_incomplete: u64,
    pub heaps_completed: u64,
    pub too_old_heaps: u64,
    pub too_new_heaps: u64,
    pub bytes_received: u64,
}

impl fmt::Display for StreamStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed={} completed={} rejected={} evicted_incomplete={} \
             too_old={} too_new={} malformed={} framing_violations={} bytes={}",
            self.packets_processed,
            self.heaps_completed,
            self.heaps_rejected,
            self.heaps_evicted_incomplete,
            self.too_old_heaps,
            self.too_new_heaps,
            self.malformed_packets,
            self.framing_violations,
            self.bytes_received,
        )
    }
}

/// Counters for one [`crate::group::ChunkStreamGroup`], aggregated across
/// its member streams plus group-level window events.
#[derive(Default)]
pub struct GroupStats {
    /// Times the window head advanced to admit a too-new chunk_id.
    pub window_slides: AtomicU64,
    /// Chunks pushed onto the data ring complete or incomplete.
    pub chunks_flushed: AtomicU64,
    /// Chunks dropped by the free-ring pop blocking under `Lossy` pressure.
    pub chunks_dropped_lossy: AtomicU64,
}

impl GroupStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            window_slides: self.window_slides.load(Ordering::Relaxed),
            chunks_flushed: self.chunks_flushed.load(Ordering::Relaxed),
            chunks_dropped_lossy: self.chunks_dropped_lossy.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupStatsSnapshot {
    pub window_slides: u64,
    pub chunks_flushed: u64,
    pub chunks_dropped_lossy: u64,
}

impl fmt::Display for GroupStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window_slides={} chunks_flushed={} chunks_dropped_lossy={}",
            self.window_slides, self.chunks_flushed, self.chunks_dropped_lossy,
        )
    }
}
