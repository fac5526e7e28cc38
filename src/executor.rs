//! Execution (external collaborator, §9): something has to put a
//! [`crate::stream::Stream`]'s ingest loop on a thread. The thread-pool
//! primitive itself is out of scope — this crate only needs "run this
//! closure somewhere" — but it still ships a usable default rather than
//! leaving every caller to hand-roll one, the same way the teacher ships
//! `DedicatedWorkerThreadSpawner` alongside the bare `ChannelDispatcher`
//! it spawns threads around.

use std::thread;

/// Capability set `{spawn}`. A stream or group calls `spawn` once per
/// ingest loop it needs running and never interacts with the executor
/// again; there is no cancellation or join handle in the contract because
/// every loop this crate spawns already terminates itself via
/// [`crate::ring::Ringbuffer::stop`] / the stream's own stop flag.
pub trait Executor: Send + Sync {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>);
}

/// Spawns one dedicated OS thread per call, named from a shared prefix so
/// `ps`/`top` output stays legible with many streams. Mirrors the
/// teacher's builder-configured `DedicatedWorkerThreadSpawner`, minus core
/// pinning: CPU affinity is a DPDK/`libc::sched_setaffinity` concern with
/// no portable Rust equivalent this crate wants to depend on (see
/// DESIGN.md).
pub struct ThreadExecutor {
    name_prefix: String,
}

impl ThreadExecutor {
    pub fn new() -> Self {
        ThreadExecutor {
            name_prefix: "spead-recv".to_string(),
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for ThreadExecutor {
    fn spawn(&self, task: Box<dyn FnOnce() + Send + 'static>) {
        let built = thread::Builder::new().name(self.name_prefix.clone()).spawn(task);
        if let Err(e) = built {
            log::error!("failed to spawn {} thread: {}", self.name_prefix, e);
        }
    }
}
