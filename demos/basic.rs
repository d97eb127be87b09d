//! Walkthrough of the pool registry: registration, acquisition, stats, and
//! auto-expiry.
//!
//! Run with: cargo run --example basic

use poolkeeper::{InstanceFactory, PoolRegistry, PoolResource, PoolSpec};
use std::time::Duration;

/// A stand-in for an expensive resource: a projectile with a reusable
/// trajectory buffer. Declares a wait time, so acquisitions expire back to
/// the pool on their own.
struct Projectile {
    trajectory: Vec<(f32, f32)>,
    speed: f32,
    ready: bool,
}

impl PoolResource for Projectile {
    type Args = f32;

    fn is_initialized(&self) -> bool {
        self.ready
    }

    fn initialize(&mut self, speed: f32) {
        self.speed = speed;
        self.ready = true;
    }

    fn wait_time(&self) -> Option<Duration> {
        Some(Duration::from_millis(200))
    }

    fn on_released(&mut self) {
        self.trajectory.clear();
    }
}

struct ProjectileFactory;

impl InstanceFactory for ProjectileFactory {
    type Key = &'static str;
    type Resource = Projectile;
    type Container = String;

    fn create(&self, key: &&'static str, container: Option<&String>) -> Projectile {
        println!(
            "   factory: creating '{}' under {:?}",
            key,
            container.map(String::as_str).unwrap_or("<root>")
        );
        Projectile {
            trajectory: Vec::new(),
            speed: 0.0,
            ready: false,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_target(false).init();

    let registry = PoolRegistry::new(ProjectileFactory);

    println!("1. Registration:");
    registry
        .register(
            PoolSpec::new("bullets", "bullet")
                .with_sizes(2, 4)
                .with_container("projectile layer".to_string()),
        )
        .unwrap();
    // Second registration of the same key: logged warning, first wins.
    registry
        .register(PoolSpec::new("bullets-dup", "bullet").with_sizes(8, 8))
        .unwrap();
    println!("   {}\n", registry.summary());

    println!("2. Acquire and manual release:");
    let bullet = registry.get_with(&"bullet", 42.0).unwrap();
    bullet.resource().trajectory.push((0.0, 0.0));
    println!("   speed = {}", bullet.resource().speed);
    println!("   {}", registry.stats(&"bullet").unwrap());
    registry.release(&bullet).unwrap();
    println!("   after release: {}\n", registry.stats(&"bullet").unwrap());

    println!("3. Auto-expiry (wait_time = 200ms, no manual release):");
    let _fired = registry.get(&"bullet").unwrap();
    println!("   just acquired: {}", registry.stats(&"bullet").unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!("   after 300ms:   {}\n", registry.stats(&"bullet").unwrap());

    println!("4. Shutdown:");
    let failures = registry.dispose_all();
    println!("   dispose_all failures: {}", failures.len());
}
