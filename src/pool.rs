//! Bounded per-key pools and the instance handles they lend out

use crate::errors::{PoolError, PoolResult};
use crate::config::PoolSpec;
use crate::resource::{InstanceFactory, PoolResource};

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Registry-unique identity of a pooled instance.
pub type InstanceId = u64;

/// Handle to one pooled resource, lent to the caller while active.
///
/// The handle is a cheap clone over shared state; the pool keeps its own
/// clone for bookkeeping, so dropping a handle never destroys the resource.
/// Return instances with `PoolRegistry::release` (or `Pool::release`), not by
/// dropping.
pub struct PooledInstance<K, T> {
    slot: Arc<Slot<K, T>>,
}

struct Slot<K, T> {
    id: InstanceId,
    key: K,
    // Bumped on every acquisition; lets a stale expiry timer be told apart
    // from the current one.
    generation: AtomicU64,
    // `None` once the owning pool has been disposed.
    resource: Mutex<Option<T>>,
}

impl<K, T> PooledInstance<K, T> {
    pub(crate) fn new(id: InstanceId, key: K, resource: T) -> Self {
        Self {
            slot: Arc::new(Slot {
                id,
                key,
                generation: AtomicU64::new(0),
                resource: Mutex::new(Some(resource)),
            }),
        }
    }

    /// Identity of this instance, unique across the registry.
    pub fn id(&self) -> InstanceId {
        self.slot.id
    }

    /// Template key of the pool this instance belongs to.
    pub fn key(&self) -> &K {
        &self.slot.key
    }

    /// Lock the underlying resource for use.
    ///
    /// Drop the guard before calling any pool or registry operation on this
    /// instance: pool operations need the same lock to fire lifecycle hooks
    /// and fail with [`PoolError::InstanceBusy`] while a guard is held.
    ///
    /// # Panics
    ///
    /// Panics if the owning pool has been disposed. Use
    /// [`try_resource`](Self::try_resource) when that is a live possibility.
    pub fn resource(&self) -> MappedMutexGuard<'_, T> {
        MutexGuard::map(self.slot.resource.lock(), |slot| {
            slot.as_mut().expect("instance has been disposed")
        })
    }

    /// Lock the underlying resource, or `None` if the instance is disposed.
    pub fn try_resource(&self) -> Option<MappedMutexGuard<'_, T>> {
        MutexGuard::try_map(self.slot.resource.lock(), |slot| slot.as_mut()).ok()
    }

    /// Whether the owning pool has destroyed this instance.
    pub fn is_disposed(&self) -> bool {
        self.slot.resource.lock().is_none()
    }

    /// Acquisition generation, bumped each time this instance is handed out.
    pub fn generation(&self) -> u64 {
        self.slot.generation.load(Ordering::Relaxed)
    }

    pub(crate) fn bump_generation(&self) -> u64 {
        self.slot.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    // Non-blocking slot lock for firing hooks: `None` means a caller still
    // holds a `resource()` guard (or the instance is disposed).
    pub(crate) fn hook_guard(&self) -> Option<MappedMutexGuard<'_, T>> {
        let guard = self.slot.resource.try_lock()?;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).ok()
    }

    pub(crate) fn take_resource(&self) -> Option<T> {
        self.slot.resource.lock().take()
    }
}

impl<K, T> Clone for PooledInstance<K, T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<K, T> PartialEq for PooledInstance<K, T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<K, T> Eq for PooledInstance<K, T> {}

impl<K: fmt::Debug, T> fmt::Debug for PooledInstance<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledInstance")
            .field("id", &self.slot.id)
            .field("key", &self.slot.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Snapshot of one pool's accounting, taken under a single lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub name: String,
    pub active: usize,
    pub inactive: usize,
}

impl PoolStats {
    /// Total instances currently managed by the pool.
    pub fn all(&self) -> usize {
        self.active + self.inactive
    }
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Type: {}, Active: {}, All: {}, Inactive: {}",
            self.name,
            self.active,
            self.all(),
            self.inactive
        )
    }
}

struct PoolInner<K, T> {
    // Most-recently-released last; acquire pops from the back.
    inactive: Vec<PooledInstance<K, T>>,
    active: HashMap<InstanceId, PooledInstance<K, T>>,
    disposed: bool,
}

/// A bounded collection of reusable instances for one template key.
///
/// Grows on demand up to `max_size` and never beyond; exhaustion fails fast
/// with [`PoolError::PoolExhausted`]. All mutable state sits behind one lock,
/// so acquire/release are safe to call from multiple threads.
pub struct Pool<F: InstanceFactory> {
    key: F::Key,
    name: String,
    container: Option<F::Container>,
    factory: Arc<F>,
    max_size: usize,
    ids: Arc<AtomicU64>,
    inner: Mutex<PoolInner<F::Key, F::Resource>>,
}

impl<F: InstanceFactory> Pool<F> {
    pub(crate) fn new(
        spec: PoolSpec<F::Key, F::Container>,
        factory: Arc<F>,
        ids: Arc<AtomicU64>,
    ) -> Self {
        let pool = Self {
            key: spec.key,
            name: spec.name,
            container: spec.container,
            factory,
            max_size: spec.max_size,
            ids,
            inner: Mutex::new(PoolInner {
                inactive: Vec::with_capacity(spec.max_size),
                active: HashMap::new(),
                disposed: false,
            }),
        };
        pool.prepopulate(spec.initial_size);
        pool
    }

    fn prepopulate(&self, count: usize) {
        let mut inner = self.inner.lock();
        for _ in 0..count {
            let instance = self.construct();
            instance.resource().on_created();
            inner.inactive.push(instance);
        }
    }

    fn construct(&self) -> PooledInstance<F::Key, F::Resource> {
        let resource = self.factory.create(&self.key, self.container.as_ref());
        let id = self.ids.fetch_add(1, Ordering::Relaxed);
        PooledInstance::new(id, self.key.clone(), resource)
    }

    /// Hand out an instance, reusing an inactive one when available.
    pub fn acquire(&self) -> PoolResult<PooledInstance<F::Key, F::Resource>> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(PoolError::PoolDisposed);
        }

        let (instance, created) = match inner.inactive.pop() {
            Some(instance) => (instance, false),
            // Inactive list is empty, so active.len() is the total count.
            None if inner.active.len() < self.max_size => (self.construct(), true),
            None => {
                return Err(PoolError::PoolExhausted {
                    max_size: self.max_size,
                });
            }
        };

        instance.bump_generation();
        {
            let Some(mut resource) = instance.hook_guard() else {
                // A caller still holds a guard on this supposedly idle
                // instance; put it back rather than deadlock on its lock.
                if !created {
                    inner.inactive.push(instance);
                }
                return Err(PoolError::InstanceBusy);
            };
            if created {
                resource.on_created();
            }
            resource.on_acquired();
        }
        inner.active.insert(instance.id(), instance.clone());
        debug!(pool = %self.name, id = instance.id(), created, "instance acquired");
        Ok(instance)
    }

    /// Return an active instance to the pool.
    ///
    /// Fails with [`PoolError::NotOwned`] if the instance belongs to another
    /// pool or is not currently active here; that check is what makes the
    /// manual-release vs. auto-expiry race safe to lose. Fails with
    /// [`PoolError::InstanceBusy`] while a [`resource`](PooledInstance::resource)
    /// guard for this instance is still held: drop the guard first.
    pub fn release(&self, instance: &PooledInstance<F::Key, F::Resource>) -> PoolResult<()> {
        self.release_inner(instance, None)
    }

    /// Timer-driven release: only succeeds if `generation` still matches the
    /// instance's current acquisition, so a stale timer from an earlier
    /// acquisition cannot steal the instance from its present owner.
    pub(crate) fn release_expired(
        &self,
        instance: &PooledInstance<F::Key, F::Resource>,
        generation: u64,
    ) -> PoolResult<()> {
        self.release_inner(instance, Some(generation))
    }

    fn release_inner(
        &self,
        instance: &PooledInstance<F::Key, F::Resource>,
        expected_generation: Option<u64>,
    ) -> PoolResult<()> {
        if *instance.key() != self.key {
            return Err(PoolError::NotOwned);
        }
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(PoolError::PoolDisposed);
        }
        let Some(owned) = inner.active.get(&instance.id()).cloned() else {
            return Err(PoolError::NotOwned);
        };
        if let Some(expected) = expected_generation
            && owned.generation() != expected
        {
            return Err(PoolError::NotOwned);
        }
        {
            let Some(mut resource) = owned.hook_guard() else {
                return Err(PoolError::InstanceBusy);
            };
            resource.on_released();
        }
        inner.active.remove(&instance.id());
        debug!(pool = %self.name, id = owned.id(), "instance released");
        inner.inactive.push(owned);
        Ok(())
    }

    /// Return every active instance to the inactive set without destroying
    /// anything. Reports the ids that were released so pending expiry timers
    /// can be cancelled.
    ///
    /// Fails with [`PoolError::InstanceBusy`], mutating nothing, if any
    /// active instance still has a held resource guard.
    pub fn clear(&self) -> PoolResult<Vec<InstanceId>> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(PoolError::PoolDisposed);
        }
        let actives: Vec<_> = inner.active.values().cloned().collect();

        // Take every slot lock up front so the operation is all-or-nothing.
        let mut guards = Vec::with_capacity(actives.len());
        for instance in &actives {
            match instance.hook_guard() {
                Some(guard) => guards.push(guard),
                None => return Err(PoolError::InstanceBusy),
            }
        }
        for guard in guards.iter_mut() {
            guard.on_released();
        }
        drop(guards);

        inner.active.clear();
        let mut ids = Vec::with_capacity(actives.len());
        for instance in actives {
            ids.push(instance.id());
            inner.inactive.push(instance);
        }
        debug!(pool = %self.name, released = ids.len(), "pool cleared");
        Ok(ids)
    }

    /// Destroy every instance and put the pool in its terminal state.
    ///
    /// No lifecycle hooks fire beyond destruction itself. Every subsequent
    /// operation on this pool fails with [`PoolError::PoolDisposed`]. Fails
    /// with [`PoolError::InstanceBusy`], leaving the pool live, if any
    /// instance still has a held resource guard.
    pub fn dispose(&self) -> PoolResult<Vec<InstanceId>> {
        let mut inner = self.inner.lock();
        if inner.disposed {
            return Err(PoolError::PoolDisposed);
        }
        let mut all: Vec<_> = inner.inactive.clone();
        all.extend(inner.active.values().cloned());
        for instance in &all {
            if instance.hook_guard().is_none() {
                return Err(PoolError::InstanceBusy);
            }
        }

        inner.disposed = true;
        inner.inactive.clear();
        inner.active.clear();
        drop(inner);

        let mut ids = Vec::with_capacity(all.len());
        for instance in all {
            ids.push(instance.id());
            if let Some(resource) = instance.take_resource() {
                self.factory.destroy(resource);
            }
        }
        debug!(pool = %self.name, destroyed = ids.len(), "pool disposed");
        Ok(ids)
    }

    /// Human-readable pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Template key this pool serves.
    pub fn key(&self) -> &F::Key {
        &self.key
    }

    /// Whether the pool has reached its terminal state.
    pub fn is_disposed(&self) -> bool {
        self.inner.lock().disposed
    }

    /// Instances currently lent out.
    pub fn count_active(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Instances waiting for reuse.
    pub fn count_inactive(&self) -> usize {
        self.inner.lock().inactive.len()
    }

    /// All instances managed by this pool.
    pub fn count_all(&self) -> usize {
        let inner = self.inner.lock();
        inner.active.len() + inner.inactive.len()
    }

    /// Consistent accounting snapshot.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            name: self.name.clone(),
            active: inner.active.len(),
            inactive: inner.inactive.len(),
        }
    }
}
