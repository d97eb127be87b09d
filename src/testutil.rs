//! Shared test fixtures: a probe resource that counts every hook invocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::resource::{InstanceFactory, PoolResource};

#[derive(Default)]
pub(crate) struct HookCounters {
    created: AtomicUsize,
    acquired: AtomicUsize,
    released: AtomicUsize,
    initialized: AtomicUsize,
    destroyed: AtomicUsize,
}

impl HookCounters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::Relaxed)
    }

    pub fn initialized(&self) -> usize {
        self.initialized.load(Ordering::Relaxed)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }
}

pub(crate) struct Probe {
    counters: Arc<HookCounters>,
    wait: Option<Duration>,
    ready: bool,
    pub last_args: u32,
}

impl PoolResource for Probe {
    type Args = u32;

    fn is_initialized(&self) -> bool {
        self.ready
    }

    fn initialize(&mut self, args: u32) {
        self.ready = true;
        self.last_args = args;
        self.counters.initialized.fetch_add(1, Ordering::Relaxed);
    }

    fn wait_time(&self) -> Option<Duration> {
        self.wait
    }

    fn on_created(&mut self) {
        self.counters.created.fetch_add(1, Ordering::Relaxed);
    }

    fn on_acquired(&mut self) {
        self.counters.acquired.fetch_add(1, Ordering::Relaxed);
    }

    fn on_released(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

pub(crate) struct ProbeFactory {
    counters: Arc<HookCounters>,
    wait: Option<Duration>,
}

impl ProbeFactory {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(HookCounters::default()),
            wait: None,
        }
    }

    pub fn with_wait(wait: Duration) -> Self {
        Self {
            counters: Arc::new(HookCounters::default()),
            wait: Some(wait),
        }
    }

    pub fn counters(&self) -> Arc<HookCounters> {
        Arc::clone(&self.counters)
    }
}

impl InstanceFactory for ProbeFactory {
    type Key = &'static str;
    type Resource = Probe;
    type Container = &'static str;

    fn create(&self, _key: &&'static str, _container: Option<&&'static str>) -> Probe {
        Probe {
            counters: Arc::clone(&self.counters),
            wait: self.wait,
            ready: false,
            last_args: 0,
        }
    }

    fn destroy(&self, resource: Probe) {
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        drop(resource);
    }
}
