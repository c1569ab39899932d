// Background index rebuilds, modeled on a single-worker job queue.
// Profile changes only raise a "pending" flag; the worker pulls the latest
// profiles when it starts a pass, so any number of changes arriving during a
// rebuild collapse into one more pass.

use crate::index::UserSimilarityIndex;
use ecoprint_core::{Error, Result, UserProfile};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

/// Supplies the current set of profiles to index
pub trait ProfileSource: Send + Sync + 'static {
    fn load_profiles(&self) -> Vec<UserProfile>;
}

impl ProfileSource for parking_lot::RwLock<Vec<UserProfile>> {
    fn load_profiles(&self) -> Vec<UserProfile> {
        self.read().clone()
    }
}

/// Rebuild counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildStats {
    /// Profile-changed notifications received
    pub requested: u64,
    /// Notifications absorbed by an already pending pass
    pub coalesced: u64,
    pub completed: u64,
    pub failed: u64,
    /// Notifications received after shutdown
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    requested: AtomicU64,
    coalesced: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

#[derive(Default)]
struct QueueState {
    pending: bool,
    running: bool,
    shutdown: bool,
}

#[derive(Default)]
struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    idle: Condvar,
    counters: Counters,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Coalescing rebuild queue with one worker thread
pub struct RebuildQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RebuildQueue {
    /// Spawn the worker. Nothing is rebuilt until the first
    /// [`profile_changed`](Self::profile_changed).
    pub fn start(index: Arc<UserSimilarityIndex>, source: Arc<dyn ProfileSource>) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = shared.clone();

        let handle = thread::Builder::new()
            .name("index-rebuild".to_string())
            .spawn(move || run_worker(&worker_shared, &index, source.as_ref()))
            .map_err(Error::Io)?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Signal that some profile was created or updated
    pub fn profile_changed(&self) {
        let mut state = self.shared.lock();
        if state.shutdown {
            self.shared.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("profile change after rebuild queue shutdown ignored");
            return;
        }
        self.shared.counters.requested.fetch_add(1, Ordering::Relaxed);
        if state.pending {
            self.shared.counters.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        state.pending = true;
        self.shared.wake.notify_one();
    }

    /// Block until no rebuild is pending or running. Returns immediately
    /// once the queue is shut down and its worker has finished.
    pub fn wait_idle(&self) {
        let mut state = self.shared.lock();
        while state.running || (state.pending && !state.shutdown) {
            state = self
                .shared
                .idle
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn stats(&self) -> RebuildStats {
        let c = &self.shared.counters;
        RebuildStats {
            requested: c.requested.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
        }
    }

    /// Stop the worker after it has drained a pending pass
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            state.shutdown = true;
            self.shared.wake.notify_all();
        }
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("index rebuild worker panicked");
            }
        }
    }
}

impl Drop for RebuildQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: &Shared, index: &UserSimilarityIndex, source: &dyn ProfileSource) {
    loop {
        let mut state = shared.lock();
        while !state.pending && !state.shutdown {
            state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if !state.pending {
            // shutdown with nothing left to do
            shared.idle.notify_all();
            break;
        }
        state.pending = false;
        state.running = true;
        drop(state);

        let profiles = source.load_profiles();
        match index.rebuild(&profiles) {
            Ok(()) => {
                shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "background index rebuild failed");
            }
        }

        let mut state = shared.lock();
        state.running = false;
        if !state.pending {
            shared.idle.notify_all();
        }
    }
}
