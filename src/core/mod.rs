//! Core scheduling abstractions: resources, tasks, queue, and dispatch.

pub mod error;
pub mod executor;
pub mod queue;
pub mod resources;
pub mod scheduler;
pub mod task;

pub use error::{AppResult, SchedulerError};
pub use executor::{DispatchSink, LeaseExecutor, WorkerSelector};
pub use queue::{LeaseQueue, QueuedLease};
pub use resources::{ResourceLedger, ResourceSet, ResourceShape};
pub use scheduler::{
    CancellationDefaults, LeaseScheduler, LocalLeaseScheduler, NoopLeaseScheduler,
};
pub use task::{
    LeaseGrant, LeaseOutcome, LeaseRequest, OwnerId, ReplySink, ResourceUsageReport,
    SchedulingFailure, ShapeDemand, StarvationReport, TaskId, TaskSpec, WorkerId,
};
