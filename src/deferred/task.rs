//! The deferred write record.

use std::fmt;
use std::time::Duration;

use crate::{Resource, StorageError, config};

/// Produces the bytes of a deferred write when it runs.
pub type ContentSupplier = Box<dyn FnOnce() -> Vec<u8> + Send + 'static>;

/// A write to `resource` that runs after `delay`.
///
/// The task is plain data: the scheduler owns it while pending and alone
/// decides whether it runs or is discarded.
pub struct DeferredWriteTask {
    resource: Resource,
    supplier: ContentSupplier,
    delay: Duration,
}

impl DeferredWriteTask {
    /// Task with the configured default delay.
    pub fn new(resource: Resource, supplier: impl FnOnce() -> Vec<u8> + Send + 'static) -> Self {
        Self::with_delay(resource, supplier, config::get().deferred_delay)
    }

    /// Task with an explicit delay.
    pub fn with_delay(
        resource: Resource,
        supplier: impl FnOnce() -> Vec<u8> + Send + 'static,
        delay: Duration,
    ) -> Self {
        Self {
            resource,
            supplier: Box::new(supplier),
            delay,
        }
    }

    /// Target of the write.
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Minimum time before the write runs.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub(crate) fn key(&self) -> String {
        self.resource.uri().to_string()
    }

    pub(crate) fn storage_key(&self) -> String {
        self.resource.storage().uri().to_string()
    }

    /// Produce the content and replace the resource with it.
    pub(crate) fn run(self) -> Result<(), StorageError> {
        let content = (self.supplier)();
        self.resource.write_now(&content, false)
    }
}

impl fmt::Debug for DeferredWriteTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredWriteTask")
            .field("resource", &self.resource.uri())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
