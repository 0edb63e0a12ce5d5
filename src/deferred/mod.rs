//! # Deferred Writes
//!
//! Buffered, debounced writes with read-your-own-writes semantics.
//!
//! [`Resource::write_deferred`](crate::Resource::write_deferred) hands a
//! [`DeferredWriteTask`] to a process-wide [`DeferredScheduler`]. Repeated
//! requests for the same resource within the delay collapse into one write
//! of the last content. Every synchronous resource or storage operation
//! flushes the matching pending writes before touching the backend.
//!
//! ## Lifecycle
//!
//! The global scheduler starts on first use. Call [`shutdown`] before the
//! process exits so buffered writes are not lost:
//!
//! ```rust
//! use anystore::{Storage, deferred};
//!
//! # fn main() -> Result<(), anystore::StorageError> {
//! let dir = tempfile::tempdir().unwrap();
//! let state = Storage::new(dir.path())?.get_resource("state.txt");
//! state.write_deferred_str("v1")?;
//!
//! // ... application runs ...
//!
//! deferred::shutdown();
//! assert_eq!(std::fs::read_to_string(dir.path().join("state.txt")).unwrap(), "v1");
//! for failure in deferred::take_failures() {
//!     eprintln!("{}: {}", failure.resource, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

mod scheduler;
mod task;

pub use scheduler::{DeferredFailure, DeferredScheduler, MAX_RECORDED_FAILURES};
pub use task::{ContentSupplier, DeferredWriteTask};

use std::sync::OnceLock;

use crate::StorageError;

static SCHEDULER: OnceLock<DeferredScheduler> = OnceLock::new();

/// The process-wide scheduler, started on first call.
pub fn global() -> &'static DeferredScheduler {
    SCHEDULER.get_or_init(DeferredScheduler::new)
}

/// Queue a task on the global scheduler.
pub fn schedule(task: DeferredWriteTask) -> Result<(), StorageError> {
    global().schedule(task)
}

/// Apply the pending write for resource `uri`, if any.
pub fn flush_resource(uri: &str) -> Result<(), StorageError> {
    SCHEDULER
        .get()
        .map_or(Ok(()), |scheduler| scheduler.flush_resource(uri))
}

/// Apply every pending write for resources of storage `uri`.
pub fn flush_storage(uri: &str) -> Result<(), StorageError> {
    SCHEDULER
        .get()
        .map_or(Ok(()), |scheduler| scheduler.flush_storage(uri))
}

/// Number of writes waiting on the global scheduler.
pub fn pending_count() -> usize {
    SCHEDULER.get().map_or(0, DeferredScheduler::pending_count)
}

/// Drain failures of background writes recorded by the global scheduler.
pub fn take_failures() -> Vec<DeferredFailure> {
    SCHEDULER
        .get()
        .map(DeferredScheduler::take_failures)
        .unwrap_or_default()
}

/// Stop the global scheduler and run everything still pending.
///
/// Deferred writes requested afterwards run synchronously.
pub fn shutdown() {
    if let Some(scheduler) = SCHEDULER.get() {
        scheduler.shutdown();
    }
}
