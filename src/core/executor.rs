//! Seams between the scheduler and the execution side of the node.

use async_trait::async_trait;

use crate::core::task::{LeaseGrant, OwnerId, TaskSpec, WorkerId};
use crate::core::SchedulerError;

/// Selects and reserves execution targets for dispatched tasks.
///
/// `acquire` must honor the task's locality preference: prefer a free target
/// already holding locality-affinity state for the task's owner, falling back
/// to any free target. Returning `None` means no free target exists and the
/// task stays queued.
pub trait WorkerSelector: Send {
    /// Reserve a target for `spec`, or `None` when all targets are busy.
    fn acquire(&mut self, spec: &TaskSpec) -> Option<WorkerId>;

    /// Return a target to the free set, recording affinity to `owner` so a
    /// future locality-preferring task from the same owner lands warm.
    fn release(&mut self, worker: WorkerId, owner: OwnerId);

    /// Undo a reservation whose handoff failed; no affinity is recorded.
    fn rollback(&mut self, worker: WorkerId);

    /// Number of currently free targets.
    fn free_count(&self) -> usize;
}

/// Fire-and-forget handoff of a granted lease to execution.
///
/// `dispatch` must not block: it either accepts the grant immediately (e.g.
/// a bounded channel with room) or fails, in which case the scheduler rolls
/// back the grant for that one task and continues its pass.
pub trait DispatchSink: Send {
    /// Hand a granted lease to execution.
    fn dispatch(&self, grant: LeaseGrant) -> Result<(), SchedulerError>;
}

/// Executes a granted lease on the worker side.
///
/// Implementations run the actual workload; the lease driver invokes this and
/// signals the scheduler once the future resolves so committed capacity is
/// released. Execution failures are the implementation's to report; from the
/// scheduler's point of view the lease completes either way.
#[async_trait]
pub trait LeaseExecutor: Send + Sync + Clone + 'static {
    /// Run the task described by `grant` to completion.
    async fn execute(&self, grant: LeaseGrant);
}
