//! Free/Data Ringbuffers (C7): bounded blocking queues of chunk handles,
//! plus a self-pipe so an external event loop (e.g. `select`/`epoll` driven
//! consumers) can wait on ring readiness alongside socket fds.
//!
//! Grounded in the teacher's `lcore::Ring` wrapper: a named, `Debug`-able
//! handle with `unsafe impl Send/Sync` standing in for a lock-free backing
//! structure. This port swaps the DPDK `rte_ring` FFI for a
//! `Mutex<VecDeque<T>>` + `Condvar`, since this crate has no hardware ring
//! buffer to bind to — the external-facing contract (bounded capacity,
//! blocking push/pop, an explicit `stop()`) is unchanged.

use std::collections::VecDeque;
use std::fmt;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::{Condvar, Mutex};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::unistd::{pipe, read, write};

use crate::error::RecvError;

struct Inner<T> {
    queue: VecDeque<T>,
    capacity: usize,
    stopped: bool,
}

/// A self-pipe used to make ring readiness visible to `select`/`poll`/`epoll`
/// based event loops. One byte is written whenever an item is pushed and one
/// byte drained whenever an item is popped, so the pipe's readable-fd state
/// tracks "non-empty" without the event loop ever touching the ring itself.
struct SelfPipe {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
}

impl SelfPipe {
    fn new() -> Result<Self, RecvError> {
        let (read_fd, write_fd) = pipe().map_err(|e| RecvError::AllocatorFailure(e.into()))?;
        for fd in [read_fd.as_raw_fd(), write_fd.as_raw_fd()] {
            let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(|e| RecvError::AllocatorFailure(e.into()))?;
            let mut flags = OFlag::from_bits_truncate(flags);
            flags.insert(OFlag::O_NONBLOCK);
            fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(|e| RecvError::AllocatorFailure(e.into()))?;
        }
        Ok(SelfPipe { read_fd, write_fd })
    }

    fn notify(&self) {
        let _ = write(&self.write_fd, &[0u8]);
    }

    fn drain_one(&self) {
        let mut buf = [0u8; 1];
        let _ = read(self.read_fd.as_raw_fd(), &mut buf);
    }
}

/// A bounded, blocking, multi-producer multi-consumer queue of `T`.
///
/// Used both as a group's free-ring (chunks awaiting reuse) and data-ring
/// (chunks awaiting consumer pickup), per §4.5/§9's ring transfer model.
pub struct Ringbuffer<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    pipe: SelfPipe,
}

impl<T> fmt::Debug for Ringbuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Ringbuffer")
            .field("len", &inner.queue.len())
            .field("capacity", &inner.capacity)
            .field("stopped", &inner.stopped)
            .finish()
    }
}

impl<T> Ringbuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, RecvError> {
        Ok(Ringbuffer {
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(capacity),
                capacity: capacity.max(1),
                stopped: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            pipe: SelfPipe::new()?,
        })
    }

    /// Fd that becomes readable whenever the ring is non-empty. Owned by
    /// the ring; callers must not close it.
    pub fn readable_fd(&self) -> RawFd {
        self.pipe.read_fd.as_raw_fd()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// Pushes `item`, blocking while the ring is full. Returns
    /// [`RecvError::Stopped`] if `stop()` was called while waiting.
    pub fn push(&self, item: T) -> Result<(), RecvError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.stopped {
                return Err(RecvError::Stopped);
            }
            if inner.queue.len() < inner.capacity {
                inner.queue.push_back(item);
                self.pipe.notify();
                self.not_empty.notify_one();
                return Ok(());
            }
            inner = self.not_full.wait(inner).unwrap();
        }
    }

    /// Pushes `item` without blocking. Returns the item back if the ring is
    /// full or stopped, for callers (e.g. `Lossy` eviction) that would
    /// rather drop than wait.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock().unwrap();
        if inner.stopped || inner.queue.len() >= inner.capacity {
            return Err(item);
        }
        inner.queue.push_back(item);
        self.pipe.notify();
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the oldest item, blocking while the ring is empty. Returns
    /// `Ok(None)` once the ring has been stopped and drained.
    pub fn pop(&self) -> Result<Option<T>, RecvError> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(item) = inner.queue.pop_front() {
                self.pipe.drain_one();
                self.not_full.notify_one();
                return Ok(Some(item));
            }
            if inner.stopped {
                return Ok(None);
            }
            inner = self.not_empty.wait(inner).unwrap();
        }
    }

    /// Pops without blocking; `None` if empty (whether or not stopped).
    pub fn try_pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let item = inner.queue.pop_front();
        if item.is_some() {
            self.pipe.drain_one();
            self.not_full.notify_one();
        }
        item
    }

    /// Wakes every blocked `push`/`pop` caller; subsequent `push` calls fail
    /// with [`RecvError::Stopped`] and `pop` drains remaining items before
    /// returning `Ok(None)` (§4.7's drain-on-stop behavior).
    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.stopped = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.lock().unwrap().stopped
    }
}
