//! Integration tests for queueing, dispatch, and release.
//!
//! These exercise the dispatch invariants end to end:
//! 1. FIFO within a resource shape
//! 2. At-most-once dispatch
//! 3. All-dimension capacity checks (no partial grants)
//! 4. Synchronous grant-or-reject decisions
//! 5. Release-triggered scheduling passes and the lease driver

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prometheus_lease_scheduler::builders::build_with_defaults;
use prometheus_lease_scheduler::config::SchedulerConfig;
use prometheus_lease_scheduler::core::{
    CancellationDefaults, DispatchSink, LeaseExecutor, LeaseGrant, LeaseOutcome, LeaseRequest,
    LeaseScheduler, LocalLeaseScheduler, OwnerId, ReplySink, ResourceSet, SchedulerError,
    SchedulingFailure, TaskId, TaskSpec,
};
use prometheus_lease_scheduler::infra::LocalWorkerPool;
use prometheus_lease_scheduler::runtime::{LeaseDriver, TokioSpawner};
use prometheus_lease_scheduler::util::now_ms;
use tokio::sync::oneshot;

fn cfg(resources: &[(&str, u64)], workers: usize) -> SchedulerConfig {
    let mut cfg = SchedulerConfig::host_defaults();
    cfg.total_resources = resources
        .iter()
        .map(|(name, qty)| ((*name).to_string(), *qty))
        .collect();
    cfg.worker_count = workers;
    cfg
}

fn shape(entries: &[(&str, u64)]) -> ResourceSet {
    ResourceSet::from_entries(entries.iter().map(|(name, qty)| ((*name).to_string(), *qty)))
}

fn spec(owner: OwnerId, required: ResourceSet) -> TaskSpec {
    TaskSpec {
        id: TaskId::random(),
        owner,
        required,
        is_actor_creation: false,
        prefer_locality: false,
        grant_or_reject: false,
        arrived_at_ms: now_ms(),
    }
}

fn submit(
    scheduler: &Arc<dyn LeaseScheduler>,
    spec: TaskSpec,
) -> oneshot::Receiver<LeaseOutcome> {
    let (reply, rx) = ReplySink::channel();
    scheduler.queue_and_schedule_task(LeaseRequest { spec, reply });
    rx
}

fn assert_granted(rx: &mut oneshot::Receiver<LeaseOutcome>) {
    assert!(matches!(
        rx.try_recv().unwrap(),
        LeaseOutcome::Granted { .. }
    ));
}

#[test]
fn test_dispatch_waits_for_release() {
    // {CPU:4}: A{CPU:2} dispatches, B{CPU:3} waits, releasing A frees B
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 4)], 4)).unwrap();
    let owner = OwnerId::random();

    let a = spec(owner, shape(&[("cpu", 2)]));
    let a_id = a.id;
    let mut rx_a = submit(&scheduler, a);
    assert_granted(&mut rx_a);

    let mut rx_b = submit(&scheduler, spec(owner, shape(&[("cpu", 3)])));
    assert!(rx_b.try_recv().is_err(), "B must stay queued on CPU:2 free");
    assert_eq!(grants.len(), 1);

    scheduler.on_lease_released(a_id);
    assert_granted(&mut rx_b);
    assert_eq!(grants.len(), 2);
}

#[test]
fn test_fifo_within_shape() {
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 2)], 4)).unwrap();
    let owner = OwnerId::random();

    let blocker = spec(owner, shape(&[("cpu", 2)]));
    let blocker_id = blocker.id;
    let mut rx = submit(&scheduler, blocker);
    assert_granted(&mut rx);

    let t1 = spec(owner, shape(&[("cpu", 1)]));
    let t2 = spec(owner, shape(&[("cpu", 1)]));
    let (t1_id, t2_id) = (t1.id, t2.id);
    let mut rx1 = submit(&scheduler, t1);
    let mut rx2 = submit(&scheduler, t2);
    assert!(rx1.try_recv().is_err());
    assert!(rx2.try_recv().is_err());

    // both become feasible in the same pass; arrival order must hold
    scheduler.on_lease_released(blocker_id);
    assert_granted(&mut rx1);
    assert_granted(&mut rx2);

    assert_eq!(grants.recv().unwrap().spec.id, blocker_id);
    assert_eq!(grants.recv().unwrap().spec.id, t1_id);
    assert_eq!(grants.recv().unwrap().spec.id, t2_id);
}

#[test]
fn test_exact_fit_zeroes_available_capacity() {
    let (scheduler, _grants) = build_with_defaults(&cfg(&[("cpu", 4), ("gpu", 1)], 4)).unwrap();
    let owner = OwnerId::random();

    let mut rx = submit(&scheduler, spec(owner, shape(&[("cpu", 4), ("gpu", 1)])));
    assert_granted(&mut rx);

    let debug = scheduler.debug_str();
    assert!(debug.contains("committed {cpu: 4, gpu: 1}"), "{debug}");
    assert!(debug.contains("available {}"), "{debug}");

    // nothing further fits, even the smallest request
    let mut rx2 = submit(&scheduler, spec(owner, shape(&[("cpu", 1)])));
    assert!(rx2.try_recv().is_err());
}

#[test]
fn test_single_short_dimension_blocks_dispatch() {
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 8), ("gpu", 1)], 4)).unwrap();
    let owner = OwnerId::random();

    let mut rx = submit(&scheduler, spec(owner, shape(&[("cpu", 1), ("gpu", 2)])));
    assert!(rx.try_recv().is_err());
    assert_eq!(grants.len(), 0);
    assert_eq!(scheduler.fill_resource_usage().by_shape.len(), 1);
}

#[test]
fn test_grant_or_reject_infeasible_shape() {
    let (scheduler, _grants) = build_with_defaults(&cfg(&[("cpu", 4)], 4)).unwrap();
    let owner = OwnerId::random();

    let mut c = spec(owner, shape(&[("gpu", 1)]));
    c.grant_or_reject = true;
    let mut rx = submit(&scheduler, c);

    // decided synchronously, never queued
    assert!(matches!(
        rx.try_recv().unwrap(),
        LeaseOutcome::Rejected {
            failure: SchedulingFailure::Infeasible,
            ..
        }
    ));
    assert!(scheduler.fill_resource_usage().by_shape.is_empty());
}

#[test]
fn test_grant_or_reject_busy_node() {
    let (scheduler, _grants) = build_with_defaults(&cfg(&[("cpu", 4)], 4)).unwrap();
    let owner = OwnerId::random();

    let mut rx = submit(&scheduler, spec(owner, shape(&[("cpu", 3)])));
    assert_granted(&mut rx);

    // feasible in principle, but not grantable right now
    let mut b = spec(owner, shape(&[("cpu", 2)]));
    b.grant_or_reject = true;
    let mut rx_b = submit(&scheduler, b);
    assert!(matches!(
        rx_b.try_recv().unwrap(),
        LeaseOutcome::Rejected {
            failure: SchedulingFailure::Unavailable,
            ..
        }
    ));
    assert!(scheduler.fill_resource_usage().by_shape.is_empty());
}

#[test]
fn test_at_most_once_dispatch() {
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 4)], 4)).unwrap();
    let owner = OwnerId::random();

    let a = spec(owner, shape(&[("cpu", 1)]));
    let a_id = a.id;
    let mut rx = submit(&scheduler, a.clone());
    assert_granted(&mut rx);

    // dispatched tasks are out of this component's hands
    assert!(!scheduler.cancel_task(a_id, SchedulingFailure::Intended, "too late"));

    // the same identity cannot re-enter the queue
    let mut rx_dup = submit(&scheduler, a);
    assert!(matches!(
        rx_dup.try_recv().unwrap(),
        LeaseOutcome::Rejected {
            failure: SchedulingFailure::Unavailable,
            ..
        }
    ));
    assert_eq!(grants.len(), 1);
}

#[test]
fn test_no_free_worker_leaves_task_queued() {
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 4)], 1)).unwrap();
    let owner = OwnerId::random();

    let a = spec(owner, shape(&[("cpu", 1)]));
    let a_id = a.id;
    let mut rx_a = submit(&scheduler, a);
    assert_granted(&mut rx_a);

    // capacity is free, but the only execution target is busy
    let mut rx_b = submit(&scheduler, spec(owner, shape(&[("cpu", 1)])));
    assert!(rx_b.try_recv().is_err());

    scheduler.on_lease_released(a_id);
    assert_granted(&mut rx_b);
    assert_eq!(grants.len(), 2);
}

#[test]
fn test_locality_preference_picks_warm_target() {
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 4)], 2)).unwrap();
    let owner = OwnerId::random();

    let warm_task = spec(owner, shape(&[("cpu", 1)]));
    let warm_id = warm_task.id;
    let mut rx = submit(&scheduler, warm_task);
    assert_granted(&mut rx);
    let warm_target = grants.recv().unwrap().target;
    scheduler.on_lease_released(warm_id);

    let mut follow_up = spec(owner, shape(&[("cpu", 1)]));
    follow_up.prefer_locality = true;
    let mut rx2 = submit(&scheduler, follow_up);
    assert_granted(&mut rx2);
    assert_eq!(grants.recv().unwrap().target, warm_target);
}

struct FailingSink;

impl DispatchSink for FailingSink {
    fn dispatch(&self, _grant: LeaseGrant) -> Result<(), SchedulerError> {
        Err(SchedulerError::DispatchFailed("target refused task".into()))
    }
}

#[test]
fn test_handoff_failure_rolls_back_and_continues() {
    let scheduler = LocalLeaseScheduler::new(
        shape(&[("cpu", 4)]),
        Box::new(LocalWorkerPool::with_slots(2)),
        Box::new(FailingSink),
        CancellationDefaults::default(),
    );
    let owner = OwnerId::random();

    let (reply, mut rx) = ReplySink::channel();
    scheduler.queue_and_schedule_task(LeaseRequest {
        spec: spec(owner, shape(&[("cpu", 2)])),
        reply,
    });
    assert!(matches!(
        rx.try_recv().unwrap(),
        LeaseOutcome::Rejected {
            failure: SchedulingFailure::RuntimeEnvSetupFailed,
            ..
        }
    ));

    // the failed grant was rolled back: nothing queued, nothing committed
    assert!(scheduler.fill_resource_usage().by_shape.is_empty());
    let debug = scheduler.debug_str();
    assert!(debug.contains("available {cpu: 4}"), "{debug}");
    assert!(debug.contains("free workers: 2"), "{debug}");
}

#[derive(Clone)]
struct SleepExecutor;

#[async_trait]
impl LeaseExecutor for SleepExecutor {
    async fn execute(&self, _grant: LeaseGrant) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_driver_releases_capacity_on_completion() {
    prometheus_lease_scheduler::util::init_tracing();
    let (scheduler, grants) = build_with_defaults(&cfg(&[("cpu", 4)], 4)).unwrap();
    let driver = LeaseDriver::start(
        &scheduler,
        grants,
        SleepExecutor,
        TokioSpawner::new(tokio::runtime::Handle::current()),
    )
    .unwrap();
    let owner = OwnerId::random();

    let rx_a = submit(&scheduler, spec(owner, shape(&[("cpu", 2)])));
    let rx_b = submit(&scheduler, spec(owner, shape(&[("cpu", 3)])));

    assert!(matches!(
        rx_a.await.unwrap(),
        LeaseOutcome::Granted { .. }
    ));
    // B waits until the driver reports A's completion, no manual release
    let outcome = tokio::time::timeout(Duration::from_secs(5), rx_b)
        .await
        .expect("B should be granted once A completes")
        .unwrap();
    assert!(matches!(outcome, LeaseOutcome::Granted { .. }));

    // dropping the last scheduler handle closes the grant channel
    drop(scheduler);
    driver.join();
}
