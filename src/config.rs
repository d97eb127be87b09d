//! Pool registration records

use crate::errors::{PoolError, PoolResult};

/// One entry of the startup pool list: which template key to pool, under
/// which container, and how many instances to keep.
///
/// # Examples
///
/// ```
/// use poolkeeper::PoolSpec;
///
/// let spec = PoolSpec::new("bullets", "bullet")
///     .with_sizes(8, 32)
///     .with_container("projectiles");
///
/// assert_eq!(spec.initial_size, 8);
/// assert_eq!(spec.max_size, 32);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolSpec<K, C> {
    /// Human-readable pool name, used in diagnostics.
    pub name: String,

    /// Template key the pool is registered under.
    pub key: K,

    /// Optional container new instances are parented to.
    pub container: Option<C>,

    /// Instances constructed eagerly at registration.
    pub initial_size: usize,

    /// Hard capacity ceiling: active + inactive never exceeds this.
    pub max_size: usize,
}

impl<K, C> PoolSpec<K, C> {
    /// Create a spec with no prepopulation and a default ceiling of 16.
    pub fn new(name: impl Into<String>, key: K) -> Self {
        Self {
            name: name.into(),
            key,
            container: None,
            initial_size: 0,
            max_size: 16,
        }
    }

    /// Set the number of instances constructed at registration.
    pub fn with_initial_size(mut self, size: usize) -> Self {
        self.initial_size = size;
        self
    }

    /// Set the capacity ceiling.
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set initial and maximum sizes in one call.
    pub fn with_sizes(mut self, initial: usize, max: usize) -> Self {
        self.initial_size = initial;
        self.max_size = max;
        self
    }

    /// Parent new instances to `container`.
    pub fn with_container(mut self, container: C) -> Self {
        self.container = Some(container);
        self
    }

    pub(crate) fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidSpec(format!(
                "pool '{}' has max_size 0",
                self.name
            )));
        }
        if self.initial_size > self.max_size {
            return Err(PoolError::InvalidSpec(format!(
                "pool '{}' has initial_size {} above max_size {}",
                self.name, self.initial_size, self.max_size
            )));
        }
        Ok(())
    }
}
