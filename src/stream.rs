//! Per-stream core (C5, §4.4): binds a [`crate::source::DatagramSource`]
//! to the packet decoder, live-heap table, and placement bridge, driving
//! one stream's packet-handling state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::StreamConfig;
use crate::error::RecvError;
use crate::group::{ChunkStreamGroup, ResolveOutcome};
use crate::heap::{BufferedPacket, LiveHeapTable};
use crate::packet::Packet;
use crate::place::{gather_item_values, ChunkStreamConfig, PlaceDiscipline, PlaceRequest, PlaceResponse};
use crate::source::DatagramSource;
use crate::stats::StreamStats;

/// A stream's lifecycle (§4.4): `Idle` before `run` is called, `Running`
/// while ingesting, `Stopping` while draining live heaps after a stop
/// packet / explicit stop / fatal source error, `Stopped` once drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// A shareable view onto a running [`Stream`]: statistics and a stop
/// switch, handed out before the stream is moved onto its ingest thread.
pub struct StreamHandle {
    stats: Arc<StreamStats>,
    stop_flag: Arc<AtomicBool>,
    state: Arc<Mutex<StreamState>>,
}

impl StreamHandle {
    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap()
    }

    /// Idempotent (§5): repeated calls are harmless no-ops once the loop
    /// has observed the first one.
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }
}

const RECV_BUF_SIZE: usize = 9200; // jumbo-frame safe

/// One SPEAD receive stream: its own decoder config, live-heap table, and
/// placement discipline, writing into a [`ChunkStreamGroup`] it shares with
/// its sibling streams.
pub struct Stream {
    stream_config: StreamConfig,
    place_config: ChunkStreamConfig,
    group: Arc<ChunkStreamGroup>,
    live_heaps: LiveHeapTable,
    stats: Arc<StreamStats>,
    stop_flag: Arc<AtomicBool>,
    state: Arc<Mutex<StreamState>>,
    /// Heap heads awaiting a batched placement decision (§4.3); only ever
    /// non-empty under `PlaceDiscipline::Batched`.
    pending_batch: Vec<(u64, PlaceRequest)>,
}

impl Stream {
    pub fn new(stream_config: StreamConfig, place_config: ChunkStreamConfig, group: Arc<ChunkStreamGroup>) -> Self {
        let max_heaps = place_config.max_heaps;
        Stream {
            stream_config,
            place_config,
            group,
            live_heaps: LiveHeapTable::new(max_heaps),
            stats: Arc::new(StreamStats::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(StreamState::Idle)),
            pending_batch: Vec::new(),
        }
    }

    /// Returns a handle for monitoring and stopping this stream. Call
    /// before [`Stream::run`] consumes `self` onto its own thread (e.g.
    /// via [`crate::executor::Executor`]).
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            stats: Arc::clone(&self.stats),
            stop_flag: Arc::clone(&self.stop_flag),
            state: Arc::clone(&self.state),
        }
    }

    /// Drives the ingest loop to completion on the calling thread. Returns
    /// once stopped, either by `StreamHandle::stop`, a stop packet, or a
    /// fatal source error.
    pub fn run(mut self, mut source: impl DatagramSource) {
        *self.state.lock().unwrap() = StreamState::Running;
        let mut buf = vec![0u8; RECV_BUF_SIZE];

        loop {
            if self.stop_flag.load(Ordering::Acquire) {
                break;
            }
            match source.recv(&mut buf) {
                Ok(n) => {
                    if self.ingest(&buf[..n]) {
                        break; // stop packet
                    }
                }
                Err(RecvError::Stopped) => break,
                Err(e) => {
                    log::warn!("datagram source failed, stopping stream: {e}");
                    break;
                }
            }
        }

        *self.state.lock().unwrap() = StreamState::Stopping;
        source.shutdown();
        self.drain();
        *self.state.lock().unwrap() = StreamState::Stopped;
    }

    /// Processes one datagram. Returns `true` if it carried a stop control
    /// (§4.4's stop propagation).
    fn ingest(&mut self, bytes: &[u8]) -> bool {
        let packet = match Packet::decode(bytes, self.stream_config.heap_address_bits) {
            Ok(packet) => packet,
            Err(_) => {
                StreamStats::incr(&self.stats.malformed_packets);
                return false;
            }
        };
        if !packet.framing_is_valid() {
            StreamStats::incr(&self.stats.framing_violations);
            return false;
        }
        if packet.is_stop() {
            return true;
        }

        StreamStats::incr(&self.stats.packets_processed);
        self.process_heap_packet(&packet);
        false
    }

    fn process_heap_packet(&mut self, packet: &Packet<'_>) {
        // A heap still awaiting a batched placement decision must not be
        // evicted from the live-heap table out from under it: the FIFO
        // eviction below has no way to single out a still-pending entry,
        // so resolve the whole outstanding batch before the table can
        // evict anything, whenever it's already at capacity.
        if !self.pending_batch.is_empty() && self.live_heaps.len() >= self.live_heaps.capacity() {
            self.flush_batch();
        }

        let (heap, is_new, evicted) = self.live_heaps.get_or_insert(packet.heap_cnt, packet.heap_length);

        if let Some(evicted) = evicted {
            if !evicted.is_complete() {
                StreamStats::incr(&self.stats.heaps_evicted_incomplete);
            }
            // Eviction before placement never invokes placement (§9 open
            // question 2); a pending_batch entry left behind for it is
            // simply discarded once its batch flushes, in flush_batch.
        }

        if is_new {
            let item_values = gather_item_values(packet, &self.place_config.items);
            let request = PlaceRequest {
                item_values,
                payload_size: packet.payload_length as usize,
                extra: Vec::new(),
            };
            match &self.place_config.place {
                PlaceDiscipline::PerHeap(_) => {
                    let response = self.place_config.place.place_one(&request);
                    if response.is_rejected() {
                        heap.mark_rejected();
                        StreamStats::incr(&self.stats.heaps_rejected);
                    } else {
                        heap.mark_placed(response);
                    }
                }
                PlaceDiscipline::Batched(_) => {
                    self.pending_batch.push((packet.heap_cnt, request));
                }
            }
        }

        if heap.is_rejected() {
            return;
        }

        if !heap.is_placed() {
            // Awaiting this heap's batched placement decision: its
            // destination is unknown, so hold the payload rather than
            // guess (§4.3).
            heap.buffered.push(BufferedPacket {
                payload_offset: packet.payload_offset,
                payload: packet.payload.to_vec(),
            });
            if self.pending_batch.len() >= self.stream_config.place_batch_size {
                self.flush_batch();
            }
            return;
        }

        self.write_packet(packet.heap_cnt, packet.payload_offset as usize, packet.payload);
    }

    /// Resolves the destination chunk for `heap_cnt` (already placed) and
    /// writes one packet's payload into it, completing the heap once its
    /// declared length has fully arrived.
    fn write_packet(&mut self, heap_cnt: u64, payload_offset: usize, payload: &[u8]) {
        let heap = match self.live_heaps.get_mut(heap_cnt) {
            Some(heap) => heap,
            None => return,
        };
        let chunk_id = heap.chunk_id;
        let heap_index = heap.heap_index as usize;
        let heap_offset = heap.heap_offset as usize;

        match self.group.resolve(chunk_id) {
            Ok(ResolveOutcome::TooOld) => {
                StreamStats::incr(&self.stats.too_old_heaps);
                self.live_heaps.remove(heap_cnt);
            }
            Ok(ResolveOutcome::Dropped) => {
                StreamStats::incr(&self.stats.too_new_heaps);
                self.live_heaps.remove(heap_cnt);
            }
            Ok(ResolveOutcome::Found(chunk)) => {
                let dest_offset = heap_offset + payload_offset;
                // Safety: the placement function is responsible for never
                // handing out overlapping (chunk_id, heap_index) slots to
                // concurrently-live heaps (§4.6).
                unsafe {
                    chunk.write_payload(dest_offset, payload);
                }
                self.stats.bytes_received.fetch_add(payload.len() as u64, Ordering::Relaxed);

                if let Some(heap) = self.live_heaps.get_mut(heap_cnt) {
                    heap.received_bytes += payload.len() as u64;
                    if heap.is_complete() {
                        chunk.mark_present(heap_index);
                        StreamStats::incr(&self.stats.heaps_completed);
                        self.live_heaps.remove(heap_cnt);
                    }
                }
            }
            Err(e) => {
                log::error!("chunk stream group resolve failed: {e}");
            }
        }
    }

    /// Resolves every outstanding batched placement request in one call to
    /// `PlaceDiscipline::place_many` (§4.3), then drains and writes every
    /// now-placed heap's buffered packets.
    fn flush_batch(&mut self) {
        if self.pending_batch.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_batch);
        let requests: Vec<PlaceRequest> = pending.iter().map(|(_, request)| request.clone()).collect();
        let mut responses = vec![PlaceResponse::reject(); requests.len()];
        self.place_config.place.place_many(&requests, &mut responses);

        for ((heap_cnt, _), response) in pending.into_iter().zip(responses) {
            let heap = match self.live_heaps.get_mut(heap_cnt) {
                Some(heap) => heap,
                // Evicted from the live-heap table before this batch
                // flushed; its placement outcome is simply discarded (§9
                // open question 2).
                None => continue,
            };

            if response.is_rejected() {
                heap.mark_rejected();
                StreamStats::incr(&self.stats.heaps_rejected);
                heap.buffered.clear();
                continue;
            }
            heap.mark_placed(response);
            let buffered = std::mem::take(&mut heap.buffered);
            for packet in buffered {
                self.write_packet(heap_cnt, packet.payload_offset as usize, &packet.payload);
            }
        }
    }

    /// Drains remaining `LiveHeap`s on stop, counting incomplete ones as
    /// evicted (§4.4's stop propagation).
    fn drain(&mut self) {
        self.flush_batch();
        for heap in self.live_heaps.drain() {
            if !heap.is_complete() {
                StreamStats::incr(&self.stats.heaps_evicted_incomplete);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::HeapAllocator;
    use crate::config::{ChunkStreamGroupConfig, EvictionMode};
    use crate::item::HEAP_CNT_ID;
    use crate::packet::encode;
    use crate::place::PlaceDiscipline;

    /// A fixed sequence of pre-encoded datagrams played back in order, for
    /// exercising `Stream::run` without a real socket.
    struct ScriptedSource {
        datagrams: Vec<Vec<u8>>,
        next: usize,
    }

    impl DatagramSource for ScriptedSource {
        fn recv(&mut self, buf: &mut [u8]) -> Result<usize, RecvError> {
            if self.next >= self.datagrams.len() {
                return Err(RecvError::Stopped);
            }
            let datagram = &self.datagrams[self.next];
            self.next += 1;
            buf[..datagram.len()].copy_from_slice(datagram);
            Ok(datagram.len())
        }

        fn shutdown(&self) {}
    }

    fn single_chunk_group() -> Arc<ChunkStreamGroup> {
        let config = ChunkStreamGroupConfig {
            max_chunks: 1,
            eviction_mode: EvictionMode::Lossy,
        };
        Arc::new(ChunkStreamGroup::new(&config, &HeapAllocator, 2, 4).unwrap())
    }

    fn place_into_chunk_zero() -> PlaceDiscipline {
        PlaceDiscipline::PerHeap(Box::new(|req: &PlaceRequest| crate::place::PlaceResponse {
            chunk_id: 0,
            heap_index: (req.item_values[0] % 2) as i64,
            heap_offset: (req.item_values[0] % 2) as i64 * 4,
        }))
    }

    #[test]
    fn processes_in_order_heaps_and_marks_present() {
        let group = single_chunk_group();
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, place_into_chunk_zero());
        let stream = Stream::new(StreamConfig::default(), place_config, Arc::clone(&group));
        let handle = stream.handle();

        let datagrams = vec![
            encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40),
            encode(1, 4, 0, 4, &[], None, &[5, 6, 7, 8], 40),
        ];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);

        assert_eq!(handle.stats().snapshot().heaps_completed, 2);
        let chunk = match group.resolve(0).unwrap() {
            ResolveOutcome::Found(chunk) => chunk,
            _ => panic!("expected chunk 0 still in window"),
        };
        assert!(chunk.is_present(0));
        assert!(chunk.is_present(1));
    }

    #[test]
    fn stop_packet_ends_the_loop() {
        let group = single_chunk_group();
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, place_into_chunk_zero());
        let stream = Stream::new(StreamConfig::default(), place_config, group);

        let datagrams = vec![
            encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40),
            encode(0, 0, 0, 0, &[], Some(2), &[], 40),
            // Never reached: the stop packet above ends the loop first.
            encode(1, 4, 0, 4, &[], None, &[9, 9, 9, 9], 40),
        ];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);
    }

    #[test]
    fn rejected_placement_increments_counter_and_drops_heap() {
        let group = single_chunk_group();
        let reject_all = PlaceDiscipline::PerHeap(Box::new(|_: &PlaceRequest| crate::place::PlaceResponse::reject()));
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, reject_all);
        let stream = Stream::new(StreamConfig::default(), place_config, group);
        let handle = stream.handle();

        let datagrams = vec![encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40)];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);

        assert_eq!(handle.stats().snapshot().heaps_rejected, 1);
        assert_eq!(handle.stats().snapshot().heaps_completed, 0);
    }

    #[test]
    fn batched_discipline_accumulates_then_places_together() {
        use std::sync::atomic::AtomicUsize;

        let group = single_chunk_group();
        let call_count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&call_count);
        let batched = PlaceDiscipline::Batched(Box::new(move |reqs, out| {
            counted.fetch_add(1, Ordering::Relaxed);
            for (req, slot) in reqs.iter().zip(out.iter_mut()) {
                *slot = crate::place::PlaceResponse {
                    chunk_id: 0,
                    heap_index: (req.item_values[0] % 2) as i64,
                    heap_offset: (req.item_values[0] % 2) as i64 * 4,
                };
            }
        }));
        let mut stream_config = StreamConfig::default();
        stream_config.place_batch_size = 2;
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, batched);
        let stream = Stream::new(stream_config, place_config, Arc::clone(&group));
        let handle = stream.handle();

        // Both heaps' first packets arrive before the batch of 2 fills,
        // so their payloads must be buffered and only written once
        // place_many resolves the whole batch together.
        let datagrams = vec![
            encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40),
            encode(1, 4, 0, 4, &[], None, &[5, 6, 7, 8], 40),
        ];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);

        assert_eq!(call_count.load(Ordering::Relaxed), 1);
        assert_eq!(handle.stats().snapshot().heaps_completed, 2);
        let chunk = match group.resolve(0).unwrap() {
            ResolveOutcome::Found(chunk) => chunk,
            _ => panic!("expected chunk 0 still in window"),
        };
        assert!(chunk.is_present(0));
        assert!(chunk.is_present(1));
    }

    #[test]
    fn batched_discipline_rejection_clears_buffered_payload() {
        let group = single_chunk_group();
        let reject_batch = PlaceDiscipline::Batched(Box::new(|reqs, out| {
            for slot in out.iter_mut().take(reqs.len()) {
                *slot = crate::place::PlaceResponse::reject();
            }
        }));
        let mut stream_config = StreamConfig::default();
        stream_config.place_batch_size = 1;
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, reject_batch);
        let stream = Stream::new(stream_config, place_config, group);
        let handle = stream.handle();

        let datagrams = vec![encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40)];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);

        assert_eq!(handle.stats().snapshot().heaps_rejected, 1);
        assert_eq!(handle.stats().snapshot().heaps_completed, 0);
    }

    #[test]
    fn malformed_packet_is_counted_not_fatal() {
        let group = single_chunk_group();
        let place_config = ChunkStreamConfig::new(vec![HEAP_CNT_ID], 1, place_into_chunk_zero());
        let stream = Stream::new(StreamConfig::default(), place_config, group);
        let handle = stream.handle();

        let mut bad = encode(0, 4, 0, 4, &[], None, &[1, 2, 3, 4], 40);
        bad[0] = 0xFF;
        let datagrams = vec![bad];
        let source = ScriptedSource { datagrams, next: 0 };
        stream.run(source);

        assert_eq!(handle.stats().snapshot().malformed_packets, 1);
    }
}
