//! Benchmarks for the lease scheduler.
//!
//! Benchmarks cover:
//! - The request hot path (enqueue plus inline scheduling pass)
//! - Full scheduling passes over deep queues of mixed shapes
//! - Demand-report snapshots

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

use prometheus_lease_scheduler::core::{
    CancellationDefaults, DispatchSink, LeaseGrant, LeaseRequest, LeaseScheduler,
    LocalLeaseScheduler, OwnerId, ReplySink, ResourceSet, SchedulerError, TaskId, TaskSpec,
};
use prometheus_lease_scheduler::infra::LocalWorkerPool;
use prometheus_lease_scheduler::util::now_ms;

/// Sink that accepts every grant, so benches measure scheduling alone.
struct NullSink;

impl DispatchSink for NullSink {
    fn dispatch(&self, _grant: LeaseGrant) -> Result<(), SchedulerError> {
        Ok(())
    }
}

fn shape(entries: &[(&str, u64)]) -> ResourceSet {
    ResourceSet::from_entries(entries.iter().map(|(name, qty)| ((*name).to_string(), *qty)))
}

fn build_scheduler(total: ResourceSet, workers: usize) -> LocalLeaseScheduler {
    LocalLeaseScheduler::new(
        total,
        Box::new(LocalWorkerPool::with_slots(workers)),
        Box::new(NullSink),
        CancellationDefaults::default(),
    )
}

fn request(owner: OwnerId, required: ResourceSet) -> LeaseRequest {
    // the dropped receiver is fine: delivery tolerates absent listeners
    let (reply, _rx) = ReplySink::channel();
    LeaseRequest {
        spec: TaskSpec {
            id: TaskId::random(),
            owner,
            required,
            is_actor_creation: false,
            prefer_locality: false,
            grant_or_reject: false,
            arrived_at_ms: now_ms(),
        },
        reply,
    }
}

fn bench_queue_and_schedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_and_schedule");
    group.throughput(Throughput::Elements(1));

    group.bench_function("dispatch_and_release", |b| {
        let scheduler = build_scheduler(shape(&[("cpu", 8)]), 8);
        let owner = OwnerId::random();
        b.iter(|| {
            let req = request(owner, shape(&[("cpu", 1)]));
            let id = req.spec.id;
            scheduler.queue_and_schedule_task(black_box(req));
            scheduler.on_lease_released(id);
        });
    });

    group.bench_function("enqueue_blocked", |b| {
        // no GPU on the node: every request parks in the queue
        let scheduler = build_scheduler(shape(&[("cpu", 1)]), 8);
        let owner = OwnerId::random();
        b.iter(|| {
            scheduler.queue_and_schedule_task(black_box(request(owner, shape(&[("gpu", 1)]))));
        });
    });

    group.finish();
}

fn bench_scheduling_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduling_pass");

    for depth in [100_usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(
            BenchmarkId::new("blocked_queue", depth),
            &depth,
            |b, &depth| {
                b.iter_batched(
                    || {
                        let scheduler = build_scheduler(shape(&[("cpu", 1)]), 8);
                        let owner = OwnerId::random();
                        for i in 0..depth {
                            // a handful of distinct infeasible shapes
                            let gpus = (i % 4 + 2) as u64;
                            scheduler.queue_and_schedule_task(request(
                                owner,
                                shape(&[("gpu", gpus)]),
                            ));
                        }
                        scheduler
                    },
                    |scheduler| scheduler.schedule_and_dispatch_tasks(),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn bench_fill_resource_usage(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_resource_usage");

    for depth in [100_usize, 1_000] {
        let scheduler = build_scheduler(shape(&[("cpu", 1)]), 8);
        let owner = OwnerId::random();
        for i in 0..depth {
            let gpus = (i % 8 + 1) as u64;
            scheduler.queue_and_schedule_task(request(owner, shape(&[("gpu", gpus)])));
        }
        group.bench_with_input(BenchmarkId::new("snapshot", depth), &depth, |b, _| {
            b.iter(|| black_box(scheduler.fill_resource_usage()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_queue_and_schedule,
    bench_scheduling_pass,
    bench_fill_resource_usage
);
criterion_main!(benches);
