//! Runtime adapters: spawning seams and the lease execution driver.

pub mod driver;
pub mod tokio_spawner;

use std::future::Future;

pub use driver::LeaseDriver;
pub use tokio_spawner::TokioSpawner;

/// Abstraction for spawning task execution on a runtime.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}
