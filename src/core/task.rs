//! Lease request descriptors, identities, and outcome delivery.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::core::resources::{ResourceSet, ResourceShape};

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identity.
            #[must_use]
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identity of a task (one lease request).
    TaskId
);
define_id!(
    /// Identity of the actor/worker that owns a task.
    OwnerId
);
define_id!(
    /// Identity of a local execution target.
    WorkerId
);

/// Reasons a queued task leaves the queue without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingFailure {
    /// Explicit, intended cancellation by the caller.
    Intended,
    /// No node can ever satisfy the task's resource shape.
    Infeasible,
    /// Upstream service unavailable, or the node cannot take the lease now.
    Unavailable,
    /// The runtime environment for the task could not be set up.
    RuntimeEnvSetupFailed,
    /// The owning actor/worker terminated.
    OwnerDied,
    /// The lease expired before it could be granted.
    LeaseExpired,
}

impl fmt::Display for SchedulingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Intended => "cancelled",
            Self::Infeasible => "infeasible",
            Self::Unavailable => "unavailable",
            Self::RuntimeEnvSetupFailed => "runtime_env_setup_failed",
            Self::OwnerDied => "owner_died",
            Self::LeaseExpired => "lease_expired",
        };
        write!(f, "{s}")
    }
}

/// Immutable description of one lease request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task identity; at most one queue slot ever holds it.
    pub id: TaskId,
    /// Owning actor/worker identity.
    pub owner: OwnerId,
    /// Resources the task must hold to run, all dimensions at once.
    pub required: ResourceSet,
    /// True for actor-creation tasks (reported separately by the
    /// starvation detector).
    pub is_actor_creation: bool,
    /// Prefer an execution target already holding locality-affinity state
    /// for this task's owner.
    pub prefer_locality: bool,
    /// Grant or reject synchronously; never defer, never spill back.
    pub grant_or_reject: bool,
    /// Arrival timestamp, milliseconds since epoch.
    pub arrived_at_ms: u128,
}

impl TaskSpec {
    /// The task's resource shape (its requirement used as a grouping key).
    #[must_use]
    pub fn shape(&self) -> &ResourceShape {
        &self.required
    }
}

/// The single outcome eventually delivered for every lease request.
#[derive(Debug, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// The lease was granted and the task handed to `target`.
    Granted {
        /// Execution target the task was assigned to.
        target: WorkerId,
    },
    /// The lease was rejected or cancelled.
    Rejected {
        /// Why the task left the queue without running.
        failure: SchedulingFailure,
        /// Human-readable context for the failure.
        message: String,
    },
}

/// One-shot handle through which exactly one [`LeaseOutcome`] is delivered.
///
/// Delivery consumes the sink, so double delivery is unrepresentable rather
/// than merely forbidden by convention.
#[derive(Debug)]
pub struct ReplySink(oneshot::Sender<LeaseOutcome>);

impl ReplySink {
    /// Create a sink and the receiver the caller waits on.
    #[must_use]
    pub fn channel() -> (Self, oneshot::Receiver<LeaseOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Deliver the outcome. A dropped receiver is not an error: the caller
    /// stopped listening, the scheduling decision stands regardless.
    pub fn deliver(self, outcome: LeaseOutcome) {
        if self.0.send(outcome).is_err() {
            tracing::debug!("lease reply dropped: receiver went away");
        }
    }
}

/// An incoming lease request: the task description plus its reply sink.
#[derive(Debug)]
pub struct LeaseRequest {
    /// Description of the task to schedule.
    pub spec: TaskSpec,
    /// Where the single grant/reject outcome goes.
    pub reply: ReplySink,
}

/// A granted lease handed off for execution.
#[derive(Debug, Clone)]
pub struct LeaseGrant {
    /// The task being started.
    pub spec: TaskSpec,
    /// The execution target the task was assigned to.
    pub target: WorkerId,
}

/// Pending demand for one resource shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDemand {
    /// The shape shared by the counted tasks.
    pub shape: ResourceShape,
    /// Number of queued tasks with that shape.
    pub count: usize,
}

/// Aggregate demand report consumed by the cluster layer's heartbeat.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsageReport {
    /// Total requested quantity per resource dimension across the queue.
    pub load: ResourceSet,
    /// Demand broken down by resource shape, first-seen order.
    pub by_shape: Vec<ShapeDemand>,
}

/// Starvation report consumed by operator tooling and the autoscaler.
#[derive(Debug, Clone, Default)]
pub struct StarvationReport {
    /// True when any queued task is blocked on resource acquisition.
    pub any_pending: bool,
    /// Pending tasks that are actor creations.
    pub num_pending_actor_creation: usize,
    /// Pending ordinary tasks.
    pub num_pending_tasks: usize,
    /// One representative stuck task, when any are pending.
    pub exemplar: Option<TaskSpec>,
}
