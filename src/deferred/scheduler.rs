//! Debouncing scheduler with flush-before-observe.
//!
//! ## State
//!
//! All bookkeeping lives behind one mutex:
//!
//! - `pending`: resource key to its single pending task
//! - `by_storage`: storage key to the resource keys pending in it
//! - `deadlines`: min-heap of `(deadline, handle, key)`; entries whose handle
//!   no longer matches `pending` are stale and skipped
//! - `running`: keys whose write is executing, with the executing thread
//!
//! A task leaves `pending` exactly once, either claimed by the worker or
//! taken by a flush, and whoever removes it runs it. A flush that finds its
//! key running on another thread waits for that run to finish.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use super::DeferredWriteTask;
use crate::StorageError;

/// Failures kept for [`DeferredScheduler::take_failures`]; older ones are dropped.
pub const MAX_RECORDED_FAILURES: usize = 256;

/// Far-future fallback when `now + delay` overflows.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// A background write that failed with no caller to report to.
#[derive(Debug)]
pub struct DeferredFailure {
    /// Canonical URI of the resource.
    pub resource: String,
    /// What went wrong.
    pub error: StorageError,
}

struct Pending {
    handle: u64,
    deadline: Instant,
    storage: String,
    task: DeferredWriteTask,
}

struct Running {
    storage: String,
    thread: ThreadId,
}

enum Due {
    Ready(String),
    At(Instant),
    Blocked,
    Idle,
}

#[derive(Default)]
struct State {
    pending: HashMap<String, Pending>,
    by_storage: HashMap<String, HashSet<String>>,
    deadlines: BinaryHeap<Reverse<(Instant, u64, String)>>,
    running: HashMap<String, Running>,
    next_handle: u64,
    shut_down: bool,
}

impl State {
    /// Remove the pending task for `key` from every index.
    fn take(&mut self, key: &str) -> Option<Pending> {
        let pending = self.pending.remove(key)?;
        if let Some(keys) = self.by_storage.get_mut(&pending.storage) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_storage.remove(&pending.storage);
            }
        }
        Some(pending)
    }

    fn next_due(&mut self, now: Instant) -> Due {
        loop {
            let Some(Reverse((deadline, handle, key))) = self.deadlines.peek().cloned() else {
                return Due::Idle;
            };
            let live = self.pending.get(&key).is_some_and(|p| p.handle == handle);
            if !live {
                self.deadlines.pop();
                continue;
            }
            if self.running.contains_key(&key) {
                return Due::Blocked;
            }
            if deadline > now {
                return Due::At(deadline);
            }
            self.deadlines.pop();
            return Due::Ready(key);
        }
    }

    fn busy_elsewhere(&self, key: &str, me: ThreadId) -> bool {
        self.running.get(key).is_some_and(|r| r.thread != me)
    }

    fn storage_busy_elsewhere(&self, storage: &str, me: ThreadId) -> bool {
        self.running
            .values()
            .any(|r| r.storage == storage && r.thread != me)
    }
}

struct Shared {
    state: Mutex<State>,
    changed: Condvar,
    failures: Mutex<VecDeque<DeferredFailure>>,
}

impl Shared {
    fn record_failure(&self, resource: String, error: StorageError) {
        tracing::error!(%resource, %error, "deferred write failed");
        let mut failures = self.failures.lock();
        if failures.len() == MAX_RECORDED_FAILURES {
            if let Some(dropped) = failures.pop_front() {
                tracing::warn!(
                    resource = %dropped.resource,
                    kept = MAX_RECORDED_FAILURES,
                    "failure log full; dropping oldest"
                );
            }
        }
        failures.push_back(DeferredFailure { resource, error });
    }
}

/// Run a task, turning a supplier panic into an error.
fn run_caught(task: DeferredWriteTask) -> Result<(), StorageError> {
    let path = task.resource().location();
    catch_unwind(AssertUnwindSafe(|| task.run())).unwrap_or_else(|_| {
        Err(StorageError::Processor {
            path,
            reason: "content supplier panicked".to_string(),
        })
    })
}

/// Debouncing scheduler for deferred writes.
///
/// At most one task is pending per resource; scheduling again replaces it
/// and restarts its delay. A dedicated `deferred-writer` thread runs tasks
/// as they come due. Flushes run a pending task early on the calling thread.
///
/// # Example
///
/// ```rust
/// use anystore::Storage;
/// use anystore::deferred::{DeferredScheduler, DeferredWriteTask};
/// use std::time::Duration;
///
/// # fn main() -> Result<(), anystore::StorageError> {
/// let dir = tempfile::tempdir().unwrap();
/// let resource = Storage::new(dir.path())?.get_resource("counter.txt");
/// let scheduler = DeferredScheduler::new();
///
/// for i in 0..10 {
///     let text = i.to_string();
///     let task = DeferredWriteTask::with_delay(
///         resource.clone(),
///         move || text.into_bytes(),
///         Duration::from_secs(60),
///     );
///     scheduler.schedule(task)?;
/// }
/// assert_eq!(scheduler.pending_count(), 1);
///
/// scheduler.flush_resource(resource.uri())?;
/// assert_eq!(resource.read_to_string()?, "9");
/// scheduler.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct DeferredScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for DeferredScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredScheduler {
    /// Create an idle scheduler. The worker thread starts on first use.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                changed: Condvar::new(),
                failures: Mutex::new(VecDeque::new()),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Queue `task`, replacing any task pending for the same resource.
    ///
    /// After [`shutdown`](Self::shutdown) the task runs immediately on the
    /// calling thread and its result is returned.
    pub fn schedule(&self, task: DeferredWriteTask) -> Result<(), StorageError> {
        let key = task.key();
        let mut state = self.shared.state.lock();
        if state.shut_down {
            drop(state);
            self.flush_resource(&key)?;
            tracing::debug!(resource = %key, "scheduler stopped; writing immediately");
            return run_caught(task);
        }

        if state.take(&key).is_some() {
            tracing::debug!(resource = %key, "replacing pending deferred write");
        }
        let now = Instant::now();
        let deadline = now
            .checked_add(task.delay())
            .unwrap_or_else(|| now + MAX_DELAY);
        let handle = state.next_handle;
        state.next_handle += 1;
        let storage = task.storage_key();
        state
            .by_storage
            .entry(storage.clone())
            .or_default()
            .insert(key.clone());
        state.deadlines.push(Reverse((deadline, handle, key.clone())));
        state.pending.insert(
            key.clone(),
            Pending {
                handle,
                deadline,
                storage,
                task,
            },
        );
        drop(state);

        tracing::debug!(resource = %key, "scheduled deferred write");
        self.ensure_worker();
        self.shared.changed.notify_all();
        Ok(())
    }

    /// Run the task pending for `key` now, on the calling thread.
    ///
    /// Waits first if another thread is already writing `key`. Returns the
    /// task's own result; `Ok` when nothing is pending.
    pub fn flush_resource(&self, key: &str) -> Result<(), StorageError> {
        let me = thread::current().id();
        let mut state = self.shared.state.lock();
        while state.busy_elsewhere(key, me) {
            self.shared.changed.wait(&mut state);
        }
        let Some(pending) = state.take(key) else {
            return Ok(());
        };
        let nested = state.running.contains_key(key);
        if !nested {
            state.running.insert(
                key.to_string(),
                Running {
                    storage: pending.storage,
                    thread: me,
                },
            );
        }

        tracing::debug!(resource = %key, "flushing deferred write");
        let result = MutexGuard::unlocked(&mut state, || run_caught(pending.task));

        if !nested {
            state.running.remove(key);
        }
        drop(state);
        self.shared.changed.notify_all();
        result
    }

    /// Run every task pending for resources of storage `storage`.
    ///
    /// All tasks run even if some fail. The first error is returned; the
    /// rest are recorded as failures.
    pub fn flush_storage(&self, storage: &str) -> Result<(), StorageError> {
        let me = thread::current().id();
        let keys = {
            let mut state = self.shared.state.lock();
            while state.storage_busy_elsewhere(storage, me) {
                self.shared.changed.wait(&mut state);
            }
            let mut keys: Vec<(Instant, u64, String)> = state
                .by_storage
                .get(storage)
                .into_iter()
                .flatten()
                .filter_map(|key| {
                    state
                        .pending
                        .get(key)
                        .map(|p| (p.deadline, p.handle, key.clone()))
                })
                .collect();
            keys.sort();
            keys
        };

        let mut first = None;
        for (_, _, key) in keys {
            if let Err(error) = self.flush_resource(&key) {
                if first.is_none() {
                    first = Some(error);
                } else {
                    self.shared.record_failure(key, error);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Number of pending tasks.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Whether a task is pending for `key`.
    pub fn is_pending(&self, key: &str) -> bool {
        self.shared.state.lock().pending.contains_key(key)
    }

    /// Drain the failures recorded so far, oldest first.
    ///
    /// Only the newest [`MAX_RECORDED_FAILURES`] are kept between calls.
    pub fn take_failures(&self) -> Vec<DeferredFailure> {
        self.shared.failures.lock().drain(..).collect()
    }

    /// Stop the worker and run every remaining task on the calling thread.
    ///
    /// Tasks run in deadline order. Failures are recorded, not returned.
    /// Idempotent; later calls to [`schedule`](Self::schedule) write
    /// synchronously.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
        }
        self.shared.changed.notify_all();

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if worker.thread().id() == thread::current().id() {
                tracing::warn!("shutdown called from the deferred writer; not joining");
            } else if worker.join().is_err() {
                tracing::error!("deferred writer thread panicked");
            }
        }

        let mut drained = 0usize;
        loop {
            let next = {
                let state = self.shared.state.lock();
                state
                    .pending
                    .iter()
                    .min_by_key(|(_, p)| (p.deadline, p.handle))
                    .map(|(key, _)| key.clone())
            };
            let Some(key) = next else { break };
            if let Err(error) = self.flush_resource(&key) {
                self.shared.record_failure(key, error);
            }
            drained += 1;
        }
        tracing::debug!(drained, "deferred scheduler shut down");
    }

    fn ensure_worker(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.shared.state.lock().shut_down {
            return;
        }
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name("deferred-writer".to_string())
            .spawn(move || worker_loop(&shared))
        {
            Ok(handle) => *worker = Some(handle),
            Err(error) => {
                tracing::error!(%error, "could not start deferred writer; writes run on flush")
            }
        }
    }
}

impl Drop for DeferredScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DeferredScheduler")
            .field("pending", &state.pending.len())
            .field("running", &state.running.len())
            .field("shut_down", &state.shut_down)
            .finish()
    }
}

fn worker_loop(shared: &Shared) {
    let me = thread::current().id();
    let mut state = shared.state.lock();
    loop {
        if state.shut_down {
            return;
        }
        match state.next_due(Instant::now()) {
            Due::Ready(key) => {
                let Some(pending) = state.take(&key) else {
                    continue;
                };
                state.running.insert(
                    key.clone(),
                    Running {
                        storage: pending.storage,
                        thread: me,
                    },
                );
                let result = MutexGuard::unlocked(&mut state, || run_caught(pending.task));
                state.running.remove(&key);
                shared.changed.notify_all();
                match result {
                    Ok(()) => tracing::debug!(resource = %key, "deferred write completed"),
                    Err(error) => shared.record_failure(key, error),
                }
            }
            Due::At(deadline) => {
                shared.changed.wait_until(&mut state, deadline);
            }
            Due::Blocked | Due::Idle => {
                shared.changed.wait(&mut state);
            }
        }
    }
}
