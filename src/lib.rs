//! # poolkeeper
//!
//! Template-keyed resource pooling: a registry of bounded pools, each
//! recycling instances of one expensive-to-create resource class, with
//! lifecycle hooks and optional auto-expiry of acquired instances.
//!
//! ## Features
//!
//! - One bounded pool per template key, growing on demand up to a hard cap
//! - Deterministic LIFO reuse and exact active/inactive accounting
//! - Lifecycle hooks (`on_created`, `on_acquired`, `on_released`) and
//!   one-time initialization guarded per instance
//! - Auto-expiry: acquired instances return to their pool after a bounded
//!   wait unless released first, with race-safe timer cancellation
//! - Duplicate registrations are a logged warning, never an error
//! - Continue-on-error bulk clear/dispose with aggregated failures
//!
//! ## Quick Start
//!
//! ```rust
//! use poolkeeper::{InstanceFactory, PoolRegistry, PoolResource, PoolSpec};
//!
//! struct ScratchBuffer {
//!     data: Vec<u8>,
//!     ready: bool,
//! }
//!
//! impl PoolResource for ScratchBuffer {
//!     type Args = usize;
//!
//!     fn is_initialized(&self) -> bool {
//!         self.ready
//!     }
//!
//!     fn initialize(&mut self, capacity: usize) {
//!         self.data.reserve(capacity);
//!         self.ready = true;
//!     }
//!
//!     fn on_released(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! struct BufferFactory;
//!
//! impl InstanceFactory for BufferFactory {
//!     type Key = &'static str;
//!     type Resource = ScratchBuffer;
//!     type Container = ();
//!
//!     fn create(&self, _key: &&'static str, _container: Option<&()>) -> ScratchBuffer {
//!         ScratchBuffer { data: Vec::new(), ready: false }
//!     }
//! }
//!
//! let registry = PoolRegistry::new(BufferFactory);
//! registry
//!     .register(PoolSpec::new("scratch buffers", "buffer").with_sizes(2, 4))
//!     .unwrap();
//!
//! let instance = registry.get_with(&"buffer", 1024).unwrap();
//! instance.resource().data.extend_from_slice(b"hello");
//! registry.release(&instance).unwrap();
//!
//! assert_eq!(registry.stats(&"buffer").unwrap().inactive, 2);
//! ```

mod config;
mod errors;
mod expiry;
mod pool;
mod registry;
mod resource;

#[cfg(test)]
mod testutil;

pub use config::PoolSpec;
pub use errors::{PoolError, PoolResult};
pub use pool::{InstanceId, Pool, PoolStats, PooledInstance};
pub use registry::PoolRegistry;
pub use resource::{InstanceFactory, PoolResource};
