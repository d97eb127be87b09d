//! Contracts between the pool and its collaborators
//!
//! Pooled objects implement [`PoolResource`]; the hosting environment supplies
//! an [`InstanceFactory`] that knows how to physically construct and destroy
//! the raw resources.

use std::fmt;
use std::hash::Hash;
use std::time::Duration;

/// Capability contract implemented by every pooled resource.
///
/// The lifecycle hooks default to no-ops, so resources that do not care about
/// a given transition implement nothing. Hooks run while the owning pool's
/// lock is held and must not call back into the pool or registry.
///
/// # Examples
///
/// ```
/// use poolkeeper::PoolResource;
///
/// struct ScratchBuffer {
///     data: Vec<u8>,
///     ready: bool,
/// }
///
/// impl PoolResource for ScratchBuffer {
///     type Args = usize;
///
///     fn is_initialized(&self) -> bool {
///         self.ready
///     }
///
///     fn initialize(&mut self, capacity: usize) {
///         self.data.reserve(capacity);
///         self.ready = true;
///     }
///
///     fn on_released(&mut self) {
///         self.data.clear();
///     }
/// }
/// ```
pub trait PoolResource: Send + 'static {
    /// Arguments accepted by [`initialize`](Self::initialize).
    type Args;

    /// Whether [`initialize`](Self::initialize) has already run.
    ///
    /// The registry checks this before initializing, so `initialize` runs at
    /// most once per instance lifetime. The resource owns the flag.
    fn is_initialized(&self) -> bool;

    /// One-time setup, invoked by the registry on the first initialized
    /// acquisition. Never re-run on reuse; per-acquisition resets belong in
    /// [`on_acquired`](Self::on_acquired).
    fn initialize(&mut self, args: Self::Args);

    /// How long an acquisition may stay active before it is forcibly
    /// released back to the pool. `None` (or a zero duration) disables
    /// auto-expiry for this resource.
    fn wait_time(&self) -> Option<Duration> {
        None
    }

    /// Fired once, right after the factory constructs the instance.
    fn on_created(&mut self) {}

    /// Fired on every acquisition, before the instance is handed out.
    fn on_acquired(&mut self) {}

    /// Fired on every release, manual or timer-driven.
    fn on_released(&mut self) {}
}

/// Factory contract supplied by the hosting environment.
///
/// One factory serves the whole registry; each pool binds it to a template
/// key and an optional container at registration time.
///
/// [`create`](Self::create) and [`destroy`](Self::destroy) may run while a
/// pool's lock is held (overflow growth, dispose) and must not call back into
/// that pool.
pub trait InstanceFactory: Send + Sync + 'static {
    /// Template key distinguishing one resource class from another.
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static;

    /// The resource type this factory produces.
    type Resource: PoolResource;

    /// Container the resources are parented under (a scene node, an arena,
    /// whatever the environment provides).
    type Container: Send + Sync + 'static;

    /// Construct a raw resource for `key`, parented to `container` if given.
    fn create(&self, key: &Self::Key, container: Option<&Self::Container>) -> Self::Resource;

    /// Tear down a resource removed from its pool. Defaults to dropping it.
    fn destroy(&self, resource: Self::Resource) {
        drop(resource);
    }
}
