//! Pumps granted leases from the dispatch channel into an executor.

use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;

use crate::core::executor::LeaseExecutor;
use crate::core::scheduler::LeaseScheduler;
use crate::core::task::LeaseGrant;
use crate::runtime::Spawn;

/// Dedicated thread that receives [`LeaseGrant`]s and spawns their execution.
///
/// Each grant becomes one spawned future: run the executor, then signal
/// `on_lease_released` so the scheduler frees the committed capacity and runs
/// a new pass. The driver holds the scheduler weakly; dropping the last
/// outside handle drops the dispatch sink, the channel disconnects, and the
/// thread exits. Closing the channel is the shutdown signal, no flag needed.
pub struct LeaseDriver {
    handle: Option<JoinHandle<()>>,
}

impl LeaseDriver {
    /// Start the driver thread.
    pub fn start<E, S>(
        scheduler: &Arc<dyn LeaseScheduler>,
        grants: Receiver<LeaseGrant>,
        executor: E,
        spawner: S,
    ) -> Result<Self, std::io::Error>
    where
        E: LeaseExecutor,
        S: Spawn + Send + 'static,
    {
        let weak: Weak<dyn LeaseScheduler> = Arc::downgrade(scheduler);
        let handle = thread::Builder::new()
            .name("lease-driver".to_string())
            .spawn(move || {
                for grant in grants.iter() {
                    let Some(scheduler) = weak.upgrade() else {
                        break;
                    };
                    let executor = executor.clone();
                    let id = grant.spec.id;
                    tracing::debug!(task = %id, target = %grant.target, "starting granted lease");
                    spawner.spawn(async move {
                        executor.execute(grant).await;
                        scheduler.on_lease_released(id);
                    });
                }
                tracing::info!("lease driver stopping: grant channel closed");
            })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the driver thread to exit. The grant channel closes once the
    /// last scheduler handle is dropped, which is what lets this return.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("lease driver thread panicked");
            }
        }
    }
}
