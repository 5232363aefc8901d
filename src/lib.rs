//! # Prometheus Lease Scheduler
//!
//! A node-local resource lease scheduler for the Prometheus AI Platform.
//!
//! This library is the local decision point of a cluster scheduler: it holds
//! tasks that cannot yet run because required resources are unavailable,
//! matches queued tasks against the node's currently free capacity,
//! dispatches runnable tasks to execution targets, and exposes cancellation,
//! demand-reporting, and starvation-detection primitives that feed a
//! cluster-wide placement/autoscaling layer.
//!
//! ## Guarantees
//!
//! - **At-most-once dispatch**: a task leaves the queue exactly once, by
//!   dispatch or cancellation, and its one-shot reply sink makes double
//!   outcome delivery unrepresentable.
//! - **Fairness**: FIFO within a resource shape; first-seen order across
//!   shapes, so late-arriving shapes cannot be starved indefinitely.
//! - **Non-blocking passes**: a scheduling pass never performs blocking I/O
//!   and never waits for a dispatched task to start; handoff is
//!   fire-and-forget through a bounded channel.
//! - **Linearized cancellation**: a successful cancel guarantees the task is
//!   never dispatched afterward; all mutations run on one logical context.
//!
//! ## Example
//!
//! ```rust,ignore
//! use prometheus_lease_scheduler::builders::build_with_defaults;
//! use prometheus_lease_scheduler::config::SchedulerConfig;
//! use prometheus_lease_scheduler::core::{LeaseRequest, ReplySink, TaskSpec};
//!
//! let cfg = SchedulerConfig::host_defaults();
//! let (scheduler, grants) = build_with_defaults(&cfg)?;
//!
//! let (reply, outcome_rx) = ReplySink::channel();
//! scheduler.queue_and_schedule_task(LeaseRequest { spec, reply });
//! // outcome_rx resolves to Granted { target } or Rejected { failure, .. }
//! ```
//!
//! The cluster layer polls `fill_resource_usage` for heartbeats and
//! `any_pending_tasks_for_resource_acquisition` for starvation alerts; both
//! are pure observers. Cross-node placement and spillback happen outside
//! this crate.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling abstractions: resources, queue, dispatch, cancellation.
pub mod core;
/// Configuration models for the scheduler and its adapters.
pub mod config;
/// Builders to construct scheduler variants from configuration.
pub mod builders;
/// Infrastructure adapters: worker bookkeeping and dispatch channels.
pub mod infra;
/// Runtime adapters and the lease execution driver.
pub mod runtime;
/// Shared utilities.
pub mod util;
