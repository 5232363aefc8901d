//! Configuration models for the lease scheduler.

pub mod scheduler;

pub use scheduler::{load_from_env, SchedulerConfig, SchedulerModeConfig};
