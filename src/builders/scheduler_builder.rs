//! Assemble a [`LeaseScheduler`] implementation from configuration.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::config::{SchedulerConfig, SchedulerModeConfig};
use crate::core::executor::{DispatchSink, WorkerSelector};
use crate::core::resources::ResourceSet;
use crate::core::scheduler::{
    CancellationDefaults, LeaseScheduler, LocalLeaseScheduler, NoopLeaseScheduler,
};
use crate::core::task::LeaseGrant;
use crate::core::SchedulerError;
use crate::infra::{grant_channel, LocalWorkerPool};

fn defaults_from(cfg: &SchedulerConfig) -> CancellationDefaults {
    CancellationDefaults {
        failure: cfg.default_cancellation_failure,
        message: cfg.default_cancellation_message.clone(),
    }
}

/// Build the scheduler variant selected by `cfg.mode` from caller-supplied
/// worker and dispatch adapters.
pub fn build_scheduler(
    cfg: &SchedulerConfig,
    workers: Box<dyn WorkerSelector>,
    dispatch: Box<dyn DispatchSink>,
) -> Result<Arc<dyn LeaseScheduler>, SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;
    match cfg.mode {
        SchedulerModeConfig::Noop => Ok(Arc::new(NoopLeaseScheduler)),
        SchedulerModeConfig::Local => {
            let total = ResourceSet::from_entries(
                cfg.total_resources
                    .iter()
                    .map(|(name, qty)| (name.clone(), *qty)),
            );
            Ok(Arc::new(LocalLeaseScheduler::new(
                total,
                workers,
                dispatch,
                defaults_from(cfg),
            )))
        }
    }
}

/// Build a local-mode scheduler wired to the default in-memory worker pool
/// and a bounded grant channel; the returned receiver feeds the lease
/// driver.
pub fn build_with_defaults(
    cfg: &SchedulerConfig,
) -> Result<(Arc<dyn LeaseScheduler>, Receiver<LeaseGrant>), SchedulerError> {
    cfg.validate().map_err(SchedulerError::InvalidConfig)?;
    let (sink, grants) = grant_channel(cfg.dispatch_queue_depth);
    let workers = Box::new(LocalWorkerPool::with_slots(cfg.worker_count));
    let scheduler = build_scheduler(cfg, workers, Box::new(sink))?;
    Ok((scheduler, grants))
}
