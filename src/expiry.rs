//! Cancellable auto-expiry tasks, keyed by instance identity

use dashmap::DashMap;
use std::future::Future;
use tokio::task::JoinHandle;

struct PendingTask {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Tracks the pending auto-release task for each active instance.
///
/// At most one task exists per instance id: scheduling again for the same id
/// aborts the previous task, so an instance is never owned by two timers.
/// Entries carry the acquisition generation they were armed for, so a stale
/// task that is already past its abort point cannot evict the entry of a
/// newer acquisition.
pub(crate) struct ExpiryScheduler {
    tasks: DashMap<u64, PendingTask>,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Spawn `task` for `id` at acquisition `generation`, cancelling any task
    /// already pending for that id.
    pub fn schedule<Fut>(&self, id: u64, generation: u64, task: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        if let Some(previous) = self.tasks.insert(id, PendingTask { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Abort the pending task for `id`, if any. Called on manual release and
    /// on bulk clear/dispose.
    pub fn cancel(&self, id: u64) {
        if let Some((_, pending)) = self.tasks.remove(&id) {
            pending.handle.abort();
        }
    }

    /// Forget the entry for `id` without aborting, but only if it still
    /// belongs to `generation`. Called by a firing task on itself; the guard
    /// keeps a stale task from removing a newer timer's entry.
    pub fn complete(&self, id: u64, generation: u64) {
        self.tasks
            .remove_if(&id, |_, pending| pending.generation == generation);
    }

    /// Abort everything. Expected at process shutdown.
    pub fn shutdown(&self) {
        for entry in self.tasks.iter() {
            entry.value().handle.abort();
        }
        self.tasks.clear();
    }

    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
