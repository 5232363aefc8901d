//! The node-local lease scheduler: queueing, dispatch, cancellation, and
//! demand reporting over a fixed pool of local resources.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::core::executor::{DispatchSink, WorkerSelector};
use crate::core::queue::{LeaseQueue, QueuedLease};
use crate::core::resources::{ResourceLedger, ResourceSet, ResourceShape};
use crate::core::task::{
    LeaseGrant, LeaseOutcome, LeaseRequest, OwnerId, ResourceUsageReport, SchedulingFailure,
    ShapeDemand, StarvationReport, TaskId, TaskSpec,
};

/// The local decision point for lease requests.
///
/// Implementations decide, given a fixed pool of locally available resources,
/// which locally-queued task runs next; they never make cross-node placement
/// decisions. Variants are selected through configuration
/// (see [`crate::builders::build_scheduler`]).
pub trait LeaseScheduler: Send + Sync {
    /// Entry point for an incoming lease request: enqueue the task, then
    /// immediately attempt to service it.
    ///
    /// With `grant_or_reject` set on the spec, the outcome is decided before
    /// this returns: granted if feasible now, otherwise rejected, never
    /// deferred. Without the flag the task may stay queued across passes and
    /// its outcome arrives through the reply sink later.
    fn queue_and_schedule_task(&self, request: LeaseRequest);

    /// Run one scheduling pass: match queued tasks against free capacity and
    /// dispatch every task that fits.
    ///
    /// Shapes are visited in first-seen order; within a shape, oldest first.
    /// A shape that does not fit free capacity is skipped, never blocked on.
    /// The pass performs no blocking I/O and does not wait for dispatched
    /// tasks to start.
    fn schedule_and_dispatch_tasks(&self);

    /// Cancel the queued task with the given identity.
    ///
    /// Returns false when the task is unknown or already dispatched;
    /// dispatched leases are not recalled. On true, the task is guaranteed
    /// never to be dispatched by this component.
    fn cancel_task(&self, id: TaskId, failure: SchedulingFailure, message: &str) -> bool;

    /// Cancel every queued task owned by `owner` (used when the owner is
    /// known to have terminated). True iff at least one task was removed.
    fn cancel_all_tasks_owned_by(
        &self,
        owner: OwnerId,
        failure: SchedulingFailure,
        message: &str,
    ) -> bool;

    /// Cancel every queued task whose required resources exactly match any
    /// of `shapes` (used to prune permanently infeasible demand). Removed
    /// tasks fail with [`SchedulingFailure::Infeasible`]. True iff at least
    /// one task was removed.
    fn cancel_tasks_with_resource_shapes(&self, shapes: &[ResourceShape]) -> bool;

    /// General form: cancel every queued task for which `predicate` holds.
    /// The specialized cancellations above are thin wrappers over this one.
    /// True iff at least one task was removed.
    fn cancel_tasks(
        &self,
        predicate: &dyn Fn(&TaskSpec) -> bool,
        failure: SchedulingFailure,
        message: &str,
    ) -> bool;

    /// Snapshot aggregate queued demand for the cluster layer's heartbeat.
    /// Pure observer; reflects the queue as of the call.
    fn fill_resource_usage(&self) -> ResourceUsageReport;

    /// Report whether queued tasks are blocked purely on resource
    /// acquisition, with counts and one exemplar. Pure observer.
    fn any_pending_tasks_for_resource_acquisition(&self) -> StarvationReport;

    /// Signal that a previously granted lease finished and its resources are
    /// free again. Triggers a new scheduling pass.
    fn on_lease_released(&self, id: TaskId);

    /// Free-form human-readable snapshot of internal state. No stability
    /// guarantee across versions; for operator inspection only.
    fn debug_str(&self) -> String;

    /// Emit observability counters as a side effect. Never alters
    /// scheduling state.
    fn record_metrics(&self);
}

/// Explicit, named defaults applied when a cancellation message is empty.
///
/// The wire contract allows callers to omit failure context; rather than
/// silent positional defaults, the substitution is configured here
/// (failure type defaults to [`SchedulingFailure::Intended`]).
#[derive(Debug, Clone)]
pub struct CancellationDefaults {
    /// Failure type external callers should use when they have no more
    /// specific reason.
    pub failure: SchedulingFailure,
    /// Message substituted when a cancellation arrives with an empty one.
    pub message: String,
}

impl Default for CancellationDefaults {
    fn default() -> Self {
        Self {
            failure: SchedulingFailure::Intended,
            message: "lease cancelled".to_string(),
        }
    }
}

/// A lease this node has granted and not yet seen released.
#[derive(Debug)]
struct GrantedLease {
    resources: ResourceSet,
    worker: crate::core::task::WorkerId,
    owner: OwnerId,
}

/// All mutable scheduler state, guarded by a single mutex.
///
/// Every mutation (enqueue, dispatch, cancellation, release) runs under
/// this one lock, so no two mutations ever interleave. Callers on other
/// threads marshal onto this context simply by calling in.
struct SchedulerState {
    ledger: ResourceLedger,
    queue: LeaseQueue,
    workers: Box<dyn WorkerSelector>,
    dispatch: Box<dyn DispatchSink>,
    granted: HashMap<TaskId, GrantedLease>,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
}

/// The full scheduler implementation.
pub struct LocalLeaseScheduler {
    state: Mutex<SchedulerState>,
    counters: Counters,
    defaults: CancellationDefaults,
}

impl LocalLeaseScheduler {
    /// Create a scheduler over a fixed total inventory, a worker selector,
    /// and a dispatch sink.
    #[must_use]
    pub fn new(
        total_resources: ResourceSet,
        workers: Box<dyn WorkerSelector>,
        dispatch: Box<dyn DispatchSink>,
        defaults: CancellationDefaults,
    ) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                ledger: ResourceLedger::new(total_resources),
                queue: LeaseQueue::new(),
                workers,
                dispatch,
                granted: HashMap::new(),
            }),
            counters: Counters::default(),
            defaults,
        }
    }

    /// The configured cancellation defaults, for callers that have no more
    /// specific failure context.
    #[must_use]
    pub fn cancellation_defaults(&self) -> &CancellationDefaults {
        &self.defaults
    }

    fn effective_message(&self, message: &str) -> String {
        if message.is_empty() {
            self.defaults.message.clone()
        } else {
            message.to_string()
        }
    }

    /// One scheduling pass over `state`. Bounded by queue size; no blocking.
    fn run_pass(&self, state: &mut SchedulerState) {
        for shape in state.queue.shapes_in_order() {
            loop {
                if !state.ledger.can_satisfy(&shape) {
                    // next shape; do not block behind this one
                    break;
                }
                let Some(front) = state.queue.front_of_shape(&shape) else {
                    break;
                };
                let front_id = front.id;
                let Some(worker) = state.workers.acquire(front) else {
                    // no free execution target; leave the shape queued
                    break;
                };
                if let Err(e) = state.ledger.commit(&shape) {
                    // can_satisfy held above, so this is a bookkeeping bug
                    tracing::error!(task = %front_id, error = %e, "commit failed mid-pass");
                    state.workers.rollback(worker);
                    break;
                }
                let Some(lease) = state.queue.remove(front_id) else {
                    state.ledger.release(&shape);
                    state.workers.rollback(worker);
                    break;
                };
                let QueuedLease { spec, reply } = lease;
                match state.dispatch.dispatch(LeaseGrant {
                    spec: spec.clone(),
                    target: worker,
                }) {
                    Ok(()) => {
                        state.granted.insert(
                            spec.id,
                            GrantedLease {
                                resources: spec.required.clone(),
                                worker,
                                owner: spec.owner,
                            },
                        );
                        self.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(task = %spec.id, target = %worker, shape = %shape, "lease granted");
                        reply.deliver(LeaseOutcome::Granted { target: worker });
                    }
                    Err(e) => {
                        // normal per-task outcome; the pass continues
                        state.ledger.release(&shape);
                        state.workers.rollback(worker);
                        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(task = %spec.id, error = %e, "execution handoff failed");
                        reply.deliver(LeaseOutcome::Rejected {
                            failure: SchedulingFailure::RuntimeEnvSetupFailed,
                            message: format!("execution handoff failed: {e}"),
                        });
                    }
                }
            }
        }
    }
}

impl LeaseScheduler for LocalLeaseScheduler {
    fn queue_and_schedule_task(&self, request: LeaseRequest) {
        let LeaseRequest { spec, reply } = request;
        let mut state = self.state.lock();

        // a removed task is never re-enqueued; re-submission is a new task
        // with a new identity
        if state.queue.contains(spec.id) || state.granted.contains_key(&spec.id) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task = %spec.id, "duplicate lease request rejected");
            reply.deliver(LeaseOutcome::Rejected {
                failure: SchedulingFailure::Unavailable,
                message: format!("task {} is already known to this node", spec.id),
            });
            return;
        }

        let id = spec.id;
        let grant_or_reject = spec.grant_or_reject;
        tracing::debug!(task = %id, shape = %spec.required, "lease request queued");
        state.queue.enqueue(QueuedLease { spec, reply });
        self.run_pass(&mut state);

        if grant_or_reject && state.queue.contains(id) {
            // decide now: no deferral, no spillback for grant-or-reject
            if let Some(lease) = state.queue.remove(id) {
                let (failure, message) = if state.ledger.fits_total(lease.spec.shape()) {
                    (
                        SchedulingFailure::Unavailable,
                        format!(
                            "insufficient free capacity for {} (available {})",
                            lease.spec.required,
                            state.ledger.available()
                        ),
                    )
                } else {
                    (
                        SchedulingFailure::Infeasible,
                        format!(
                            "shape {} exceeds node total capacity {}",
                            lease.spec.required,
                            state.ledger.total()
                        ),
                    )
                };
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::info!(task = %id, %failure, "grant-or-reject lease rejected");
                lease.reply.deliver(LeaseOutcome::Rejected { failure, message });
            }
        }
    }

    fn schedule_and_dispatch_tasks(&self) {
        let mut state = self.state.lock();
        self.run_pass(&mut state);
    }

    fn cancel_task(&self, id: TaskId, failure: SchedulingFailure, message: &str) -> bool {
        self.cancel_tasks(&|spec| spec.id == id, failure, message)
    }

    fn cancel_all_tasks_owned_by(
        &self,
        owner: OwnerId,
        failure: SchedulingFailure,
        message: &str,
    ) -> bool {
        self.cancel_tasks(&|spec| spec.owner == owner, failure, message)
    }

    fn cancel_tasks_with_resource_shapes(&self, shapes: &[ResourceShape]) -> bool {
        self.cancel_tasks(
            &|spec| shapes.iter().any(|shape| shape == spec.shape()),
            SchedulingFailure::Infeasible,
            "resource shape is no longer satisfiable by any node",
        )
    }

    fn cancel_tasks(
        &self,
        predicate: &dyn Fn(&TaskSpec) -> bool,
        failure: SchedulingFailure,
        message: &str,
    ) -> bool {
        let removed = {
            let mut state = self.state.lock();
            state.queue.remove_matching(|spec| predicate(spec))
        };
        let any = !removed.is_empty();
        let message = self.effective_message(message);
        for lease in removed {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            tracing::info!(task = %lease.spec.id, %failure, "queued lease cancelled");
            lease.reply.deliver(LeaseOutcome::Rejected {
                failure,
                message: message.clone(),
            });
        }
        any
    }

    fn fill_resource_usage(&self) -> ResourceUsageReport {
        let state = self.state.lock();
        let mut load = ResourceSet::new();
        for spec in state.queue.iter_specs() {
            load = load.add(&spec.required);
        }
        let by_shape = state
            .queue
            .shape_counts()
            .map(|(shape, count)| ShapeDemand {
                shape: shape.clone(),
                count,
            })
            .collect();
        ResourceUsageReport { load, by_shape }
    }

    fn any_pending_tasks_for_resource_acquisition(&self) -> StarvationReport {
        let state = self.state.lock();
        let num_pending_actor_creation = state
            .queue
            .iter_specs()
            .filter(|spec| spec.is_actor_creation)
            .count();
        let num_pending_tasks = state.queue.len() - num_pending_actor_creation;
        StarvationReport {
            any_pending: !state.queue.is_empty(),
            num_pending_actor_creation,
            num_pending_tasks,
            exemplar: state.queue.first_queued().cloned(),
        }
    }

    fn on_lease_released(&self, id: TaskId) {
        let mut state = self.state.lock();
        let Some(granted) = state.granted.remove(&id) else {
            tracing::warn!(task = %id, "release for unknown lease ignored");
            return;
        };
        tracing::debug!(task = %id, freed = %granted.resources, "lease released");
        state.ledger.release(&granted.resources);
        state.workers.release(granted.worker, granted.owner);
        self.run_pass(&mut state);
    }

    fn debug_str(&self) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        out.push_str("LocalLeaseScheduler:\n");
        out.push_str(&format!(
            "- queued: {} task(s) across {} shape(s)\n",
            state.queue.len(),
            state.queue.shapes_in_order().len()
        ));
        for (shape, count) in state.queue.shape_counts() {
            out.push_str(&format!("  - {shape}: {count} pending\n"));
        }
        out.push_str(&format!("- granted: {} lease(s)\n", state.granted.len()));
        out.push_str(&format!(
            "- ledger: total {}, committed {}, available {}\n",
            state.ledger.total(),
            state.ledger.committed(),
            state.ledger.available()
        ));
        out.push_str(&format!("- free workers: {}\n", state.workers.free_count()));
        out
    }

    fn record_metrics(&self) {
        let (queued, granted) = {
            let state = self.state.lock();
            (state.queue.len(), state.granted.len())
        };
        tracing::info!(
            target: "prometheus_lease_scheduler::metrics",
            dispatched = self.counters.dispatched.load(Ordering::Relaxed),
            cancelled = self.counters.cancelled.load(Ordering::Relaxed),
            rejected = self.counters.rejected.load(Ordering::Relaxed),
            queued,
            granted,
            "scheduler metrics"
        );
    }
}

/// Inert variant for nodes that do not take leases (drain or head-node
/// role): every request is rejected immediately and all reports are empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLeaseScheduler;

impl LeaseScheduler for NoopLeaseScheduler {
    fn queue_and_schedule_task(&self, request: LeaseRequest) {
        tracing::debug!(task = %request.spec.id, "noop scheduler rejecting lease");
        request.reply.deliver(LeaseOutcome::Rejected {
            failure: SchedulingFailure::Unavailable,
            message: "lease scheduling is disabled on this node".to_string(),
        });
    }

    fn schedule_and_dispatch_tasks(&self) {}

    fn cancel_task(&self, _id: TaskId, _failure: SchedulingFailure, _message: &str) -> bool {
        false
    }

    fn cancel_all_tasks_owned_by(
        &self,
        _owner: OwnerId,
        _failure: SchedulingFailure,
        _message: &str,
    ) -> bool {
        false
    }

    fn cancel_tasks_with_resource_shapes(&self, _shapes: &[ResourceShape]) -> bool {
        false
    }

    fn cancel_tasks(
        &self,
        _predicate: &dyn Fn(&TaskSpec) -> bool,
        _failure: SchedulingFailure,
        _message: &str,
    ) -> bool {
        false
    }

    fn fill_resource_usage(&self) -> ResourceUsageReport {
        ResourceUsageReport::default()
    }

    fn any_pending_tasks_for_resource_acquisition(&self) -> StarvationReport {
        StarvationReport::default()
    }

    fn on_lease_released(&self, id: TaskId) {
        tracing::warn!(task = %id, "noop scheduler ignoring lease release");
    }

    fn debug_str(&self) -> String {
        "NoopLeaseScheduler (lease scheduling disabled)".to_string()
    }

    fn record_metrics(&self) {}
}
