//! The pool registry: one pool per template key, plus the public API

use crate::config::PoolSpec;
use crate::errors::{PoolError, PoolResult};
use crate::expiry::ExpiryScheduler;
use crate::pool::{Pool, PoolStats, PooledInstance};
use crate::resource::{InstanceFactory, PoolResource};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Process-wide pool registry, constructed once at startup and shared as
/// `Arc<PoolRegistry<F>>`.
///
/// There is deliberately no global instance: pass (or inject) the `Arc`
/// wherever pool access is needed.
///
/// Acquiring a resource whose [`wait_time`](PoolResource::wait_time) is
/// positive spawns an auto-expiry task and therefore requires an ambient
/// tokio runtime; resources without expiry work fine without one.
pub struct PoolRegistry<F: InstanceFactory> {
    factory: Arc<F>,
    pools: DashMap<F::Key, Arc<Pool<F>>>,
    expiry: ExpiryScheduler,
    ids: Arc<AtomicU64>,
    weak_self: Weak<Self>,
}

impl<F: InstanceFactory> PoolRegistry<F> {
    /// Create the registry around the environment's factory.
    pub fn new(factory: F) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            factory: Arc::new(factory),
            pools: DashMap::new(),
            expiry: ExpiryScheduler::new(),
            ids: Arc::new(AtomicU64::new(0)),
            weak_self: weak_self.clone(),
        })
    }

    /// Register a pool for `spec.key` and eagerly construct its initial
    /// instances.
    ///
    /// A key that is already registered with a live pool is a warning and a
    /// no-op: the first registration wins. A key whose pool has been disposed
    /// is replaced, which is the only recovery path after a dispose.
    pub fn register(&self, spec: PoolSpec<F::Key, F::Container>) -> PoolResult<()> {
        spec.validate()?;
        if let Some(existing) = self.pools.get(&spec.key)
            && !existing.value().is_disposed()
        {
            warn!(
                key = ?spec.key,
                name = %spec.name,
                "duplicate pool registration ignored, first registration wins"
            );
            return Ok(());
        }

        // Build (and prepopulate through the factory) before touching the
        // map, so a slow factory never stalls other registry calls and a
        // factory may itself consult the registry.
        let key = spec.key.clone();
        let initial_size = spec.initial_size;
        let max_size = spec.max_size;
        let pool = self.build_pool(spec);

        let mut losing_pool = None;
        match self.pools.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_disposed() {
                    info!(key = ?occupied.key(), name = %pool.name(), "replacing disposed pool");
                    occupied.insert(pool);
                } else {
                    // Lost a registration race since the check above.
                    warn!(
                        key = ?occupied.key(),
                        name = %pool.name(),
                        "duplicate pool registration ignored, first registration wins"
                    );
                    losing_pool = Some(pool);
                }
            }
            Entry::Vacant(vacant) => {
                info!(
                    key = ?vacant.key(),
                    name = %pool.name(),
                    initial_size,
                    max_size,
                    "pool registered"
                );
                vacant.insert(pool);
            }
        }
        // Tear down the loser's eagerly built instances outside the map
        // guard.
        if let Some(pool) = losing_pool {
            let _ = pool.dispose();
        }
        Ok(())
    }

    fn build_pool(&self, spec: PoolSpec<F::Key, F::Container>) -> Arc<Pool<F>> {
        Arc::new(Pool::new(
            spec,
            Arc::clone(&self.factory),
            Arc::clone(&self.ids),
        ))
    }

    /// Acquire an instance of `key`'s template.
    pub fn get(&self, key: &F::Key) -> PoolResult<PooledInstance<F::Key, F::Resource>> {
        let pool = self.pool_for(key)?;
        let instance = pool.acquire()?;
        self.arm_expiry(&instance);
        Ok(instance)
    }

    /// Acquire an instance and, if it has never been initialized, run its
    /// one-time initialization with `args`.
    ///
    /// Already-initialized instances are returned unchanged; per-acquisition
    /// resets belong in [`PoolResource::on_acquired`].
    pub fn get_with(
        &self,
        key: &F::Key,
        args: <F::Resource as PoolResource>::Args,
    ) -> PoolResult<PooledInstance<F::Key, F::Resource>> {
        let pool = self.pool_for(key)?;
        let instance = pool.acquire()?;
        {
            let mut resource = instance.resource();
            if !resource.is_initialized() {
                resource.initialize(args);
            }
        }
        self.arm_expiry(&instance);
        Ok(instance)
    }

    /// Return an instance to its owning pool, cancelling any pending
    /// auto-expiry timer.
    ///
    /// [`PoolError::NotOwned`] means the instance was not active: for the
    /// caller who raced a just-fired expiry timer that is a benign outcome,
    /// for anyone else it signals misuse.
    pub fn release(&self, instance: &PooledInstance<F::Key, F::Resource>) -> PoolResult<()> {
        let pool = self.pool_for(instance.key())?;
        pool.release(instance)?;
        // Only a successful release disarms the timer; a failed attempt
        // (say, [`PoolError::InstanceBusy`]) leaves the instance active and
        // its expiry pending.
        self.expiry.cancel(instance.id());
        Ok(())
    }

    /// Soft-reset one pool: every active instance returns to the inactive
    /// set. Returns how many were released.
    pub fn clear(&self, key: &F::Key) -> PoolResult<usize> {
        let pool = self.pool_for(key)?;
        let ids = pool.clear()?;
        for id in &ids {
            self.expiry.cancel(*id);
        }
        Ok(ids.len())
    }

    /// Destroy one pool's instances and put it in its terminal state.
    /// Returns how many instances were destroyed.
    pub fn dispose(&self, key: &F::Key) -> PoolResult<usize> {
        let pool = self.pool_for(key)?;
        let ids = pool.dispose()?;
        for id in &ids {
            self.expiry.cancel(*id);
        }
        Ok(ids.len())
    }

    /// Soft-reset every pool, continuing past per-pool failures. Returns the
    /// failures that occurred.
    pub fn clear_all(&self) -> Vec<(F::Key, PoolError)> {
        let mut failures = Vec::new();
        for entry in self.pools.iter() {
            match entry.value().clear() {
                Ok(ids) => {
                    for id in ids {
                        self.expiry.cancel(id);
                    }
                }
                Err(error) => failures.push((entry.key().clone(), error)),
            }
        }
        failures
    }

    /// Dispose every pool and shut the expiry scheduler down. Expected only
    /// at process shutdown. Continues past per-pool failures and returns
    /// them.
    pub fn dispose_all(&self) -> Vec<(F::Key, PoolError)> {
        let mut failures = Vec::new();
        for entry in self.pools.iter() {
            if let Err(error) = entry.value().dispose() {
                failures.push((entry.key().clone(), error));
            }
        }
        self.expiry.shutdown();
        debug!(failures = failures.len(), "registry disposed");
        failures
    }

    /// Accounting snapshot for one pool.
    pub fn stats(&self, key: &F::Key) -> PoolResult<PoolStats> {
        self.pool_for(key).map(|pool| pool.stats())
    }

    /// One formatted diagnostics line per registered pool.
    pub fn summary(&self) -> String {
        let lines: Vec<String> = self
            .pools
            .iter()
            .map(|entry| entry.value().stats().to_string())
            .collect();
        lines.join("\n")
    }

    /// Direct access to the pool registered for `key`, if any.
    pub fn pool(&self, key: &F::Key) -> Option<Arc<Pool<F>>> {
        self.pools.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn pool_for(&self, key: &F::Key) -> PoolResult<Arc<Pool<F>>> {
        self.pool(key)
            .ok_or_else(|| PoolError::PoolNotFound(format!("{key:?}")))
    }

    fn arm_expiry(&self, instance: &PooledInstance<F::Key, F::Resource>) {
        let Some(wait) = instance.resource().wait_time() else {
            return;
        };
        if wait.is_zero() {
            return;
        }

        let registry = self.weak_self.clone();
        let instance = instance.clone();
        let id = instance.id();
        // The timer is pinned to this acquisition's generation: if it fires
        // after the instance has been released and re-acquired, the stale
        // generation keeps it from touching the newer acquisition or its
        // scheduler entry.
        let generation = instance.generation();
        self.expiry.schedule(id, generation, async move {
            tokio::time::sleep(wait).await;
            let Some(registry) = registry.upgrade() else {
                return;
            };
            registry.expiry.complete(id, generation);
            let Ok(pool) = registry.pool_for(instance.key()) else {
                return;
            };
            match pool.release_expired(&instance, generation) {
                Ok(()) => debug!(id, ?wait, "instance auto-released"),
                // A manual release won the race; nothing left to do.
                Err(PoolError::NotOwned) => {}
                Err(error) => debug!(id, %error, "auto-release skipped"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ProbeFactory;
    use std::time::Duration;

    fn registry_with(
        factory: ProbeFactory,
        specs: &[(&'static str, usize, usize)],
    ) -> Arc<PoolRegistry<ProbeFactory>> {
        let registry = PoolRegistry::new(factory);
        for (key, initial, max) in specs {
            registry
                .register(PoolSpec::new(*key, *key).with_sizes(*initial, *max))
                .unwrap();
        }
        registry
    }

    #[test]
    fn get_on_unknown_key_fails() {
        let registry = registry_with(ProbeFactory::new(), &[]);
        assert!(matches!(
            registry.get(&"missing"),
            Err(PoolError::PoolNotFound(_))
        ));
    }

    #[test]
    fn duplicate_registration_keeps_first_config() {
        // Scenario: register the same key twice with different sizes.
        let registry = registry_with(ProbeFactory::new(), &[("probe", 2, 3)]);
        registry
            .register(PoolSpec::new("bigger", "probe").with_sizes(5, 10))
            .unwrap();

        let stats = registry.stats(&"probe").unwrap();
        assert_eq!(stats.name, "probe");
        assert_eq!(stats.inactive, 2);

        // Capacity still follows the first config: max_size 3, not 10.
        let _a = registry.get(&"probe").unwrap();
        let _b = registry.get(&"probe").unwrap();
        let _c = registry.get(&"probe").unwrap();
        assert!(matches!(
            registry.get(&"probe"),
            Err(PoolError::PoolExhausted { max_size: 3 })
        ));
    }

    #[test]
    fn invalid_spec_is_rejected() {
        let registry = registry_with(ProbeFactory::new(), &[]);
        let result = registry.register(PoolSpec::new("bad", "bad").with_sizes(4, 2));
        assert!(matches!(result, Err(PoolError::InvalidSpec(_))));
        assert!(registry.pool(&"bad").is_none());
    }

    #[test]
    fn get_with_initializes_exactly_once() {
        let factory = ProbeFactory::new();
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        let instance = registry.get_with(&"probe", 7).unwrap();
        assert_eq!(counters.initialized(), 1);
        assert_eq!(instance.resource().last_args, 7);
        registry.release(&instance).unwrap();

        // Reacquiring with new args must not re-run initialization.
        let again = registry.get_with(&"probe", 99).unwrap();
        assert_eq!(again.id(), instance.id());
        assert_eq!(counters.initialized(), 1);
        assert_eq!(again.resource().last_args, 7);
    }

    #[test]
    fn release_routes_to_owning_pool() {
        let factory = ProbeFactory::new();
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1), ("other", 1, 1)]);

        let instance = registry.get(&"probe").unwrap();
        registry.release(&instance).unwrap();
        assert_eq!(counters.released(), 1);
        assert_eq!(registry.stats(&"probe").unwrap().inactive, 1);
        assert_eq!(registry.stats(&"other").unwrap().inactive, 1);

        assert_eq!(registry.release(&instance), Err(PoolError::NotOwned));
    }

    #[test]
    fn release_of_instance_with_unknown_pool_fails() {
        let other = registry_with(ProbeFactory::new(), &[("other", 1, 1)]);
        let stranger = other.get(&"other").unwrap();

        let registry = registry_with(ProbeFactory::new(), &[("probe", 1, 1)]);
        assert!(matches!(
            registry.release(&stranger),
            Err(PoolError::PoolNotFound(_))
        ));
    }

    #[test]
    fn dispose_makes_pool_terminal() {
        // Scenario: dispose(K) then get(K).
        let registry = registry_with(ProbeFactory::new(), &[("probe", 2, 3)]);
        assert_eq!(registry.dispose(&"probe").unwrap(), 2);
        assert!(matches!(
            registry.get(&"probe"),
            Err(PoolError::PoolDisposed)
        ));
    }

    #[test]
    fn reregistration_after_dispose_replaces_pool() {
        let registry = registry_with(ProbeFactory::new(), &[("probe", 2, 3)]);
        registry.dispose(&"probe").unwrap();

        registry
            .register(PoolSpec::new("probe-v2", "probe").with_sizes(1, 2))
            .unwrap();
        let stats = registry.stats(&"probe").unwrap();
        assert_eq!(stats.name, "probe-v2");
        assert_eq!(stats.inactive, 1);
        registry.get(&"probe").unwrap();
    }

    #[test]
    fn clear_returns_active_instances_for_key() {
        let registry = registry_with(ProbeFactory::new(), &[("probe", 2, 3)]);
        let _a = registry.get(&"probe").unwrap();
        let _b = registry.get(&"probe").unwrap();

        assert_eq!(registry.clear(&"probe").unwrap(), 2);
        let stats = registry.stats(&"probe").unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.inactive, 2);
    }

    #[test]
    fn bulk_operations_continue_on_error() {
        let registry = registry_with(ProbeFactory::new(), &[("probe", 1, 1), ("other", 1, 1)]);
        registry.dispose(&"probe").unwrap();

        let failures = registry.dispose_all();
        assert_eq!(failures, vec![("probe", PoolError::PoolDisposed)]);
        assert!(registry.pool(&"other").unwrap().is_disposed());
    }

    #[test]
    fn clear_all_resets_every_pool() {
        let registry = registry_with(ProbeFactory::new(), &[("probe", 1, 1), ("other", 1, 1)]);
        let _a = registry.get(&"probe").unwrap();
        let _b = registry.get(&"other").unwrap();

        assert!(registry.clear_all().is_empty());
        assert_eq!(registry.stats(&"probe").unwrap().active, 0);
        assert_eq!(registry.stats(&"other").unwrap().active, 0);
    }

    #[test]
    fn summary_lists_one_line_per_pool() {
        let registry = registry_with(ProbeFactory::new(), &[("probe", 2, 3)]);
        let _held = registry.get(&"probe").unwrap();
        assert_eq!(
            registry.summary(),
            "Type: probe, Active: 1, All: 2, Inactive: 1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn auto_expiry_releases_after_wait() {
        let factory = ProbeFactory::with_wait(Duration::from_millis(100));
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        let instance = registry.get(&"probe").unwrap();
        assert_eq!(registry.stats(&"probe").unwrap().active, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counters.released(), 1);
        let stats = registry.stats(&"probe").unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.inactive, 1);

        // The expired instance is back in rotation.
        let again = registry.get(&"probe").unwrap();
        assert_eq!(again.id(), instance.id());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_release_cancels_the_timer() {
        let factory = ProbeFactory::with_wait(Duration::from_millis(100));
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        let instance = registry.get(&"probe").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.release(&instance).unwrap();

        // Past the original deadline: the timer must not release a second
        // time or corrupt the counters.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(counters.released(), 1);
        let stats = registry.stats(&"probe").unwrap();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.inactive, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn each_acquisition_rearms_the_timer() {
        let factory = ProbeFactory::with_wait(Duration::from_millis(100));
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        registry.get(&"probe").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counters.released(), 1);

        registry.get(&"probe").unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(counters.released(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rearmed_timer_uses_its_own_deadline() {
        let factory = ProbeFactory::with_wait(Duration::from_millis(100));
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        // First acquisition's timer would fire at t=100.
        let first = registry.get(&"probe").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.release(&first).unwrap();

        // Same slot, new acquisition: its deadline is t=160, not t=100.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = registry.get(&"probe").unwrap();
        assert_eq!(second.id(), first.id());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(counters.released(), 1);
        assert_eq!(registry.stats(&"probe").unwrap().active, 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.released(), 2);
        assert_eq!(registry.stats(&"probe").unwrap().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dispose_all_cancels_pending_timers() {
        let factory = ProbeFactory::with_wait(Duration::from_millis(100));
        let counters = factory.counters();
        let registry = registry_with(factory, &[("probe", 1, 1)]);

        let _held = registry.get(&"probe").unwrap();
        assert!(registry.dispose_all().is_empty());
        assert_eq!(counters.destroyed(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(counters.released(), 0);
    }
}
