//! Scheduler configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::task::SchedulingFailure;

/// Environment variable naming the JSON config file to load.
pub const CONFIG_PATH_ENV: &str = "LEASE_SCHEDULER_CONFIG";

/// Scheduler implementation selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerModeConfig {
    /// Full local scheduler.
    Local,
    /// Inert scheduler for nodes not taking leases (drain/head-node role).
    Noop,
}

/// Root scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Which scheduler implementation to build.
    pub mode: SchedulerModeConfig,
    /// The node's fixed total inventory, resource name to quantity.
    /// Externally computed; this component only spends it.
    pub total_resources: HashMap<String, u64>,
    /// Number of local execution targets.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Bounded depth of the dispatch handoff channel.
    #[serde(default = "default_dispatch_queue_depth")]
    pub dispatch_queue_depth: usize,
    /// Failure type substituted when a cancellation arrives without one.
    /// Default: `intended`.
    #[serde(default = "default_cancellation_failure")]
    pub default_cancellation_failure: SchedulingFailure,
    /// Message substituted when a cancellation arrives with an empty one.
    #[serde(default = "default_cancellation_message")]
    pub default_cancellation_message: String,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

const fn default_dispatch_queue_depth() -> usize {
    1024
}

const fn default_cancellation_failure() -> SchedulingFailure {
    SchedulingFailure::Intended
}

fn default_cancellation_message() -> String {
    "lease cancelled".to_string()
}

impl SchedulerConfig {
    /// A local-mode config with CPU capacity and worker count derived from
    /// the host.
    #[must_use]
    pub fn host_defaults() -> Self {
        let mut total_resources = HashMap::new();
        total_resources.insert("cpu".to_string(), num_cpus::get() as u64);
        Self {
            mode: SchedulerModeConfig::Local,
            total_resources,
            worker_count: default_worker_count(),
            dispatch_queue_depth: default_dispatch_queue_depth(),
            default_cancellation_failure: default_cancellation_failure(),
            default_cancellation_message: default_cancellation_message(),
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.mode == SchedulerModeConfig::Noop {
            // an inert scheduler needs no inventory
            return Ok(());
        }
        if self.total_resources.values().all(|q| *q == 0) {
            return Err("total_resources must carry at least one positive quantity".into());
        }
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.dispatch_queue_depth == 0 {
            return Err("dispatch_queue_depth must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Load configuration from the file named by [`CONFIG_PATH_ENV`], honoring a
/// `.env` file if present. Falls back to [`SchedulerConfig::host_defaults`]
/// when the variable is unset.
pub fn load_from_env() -> Result<SchedulerConfig, String> {
    // best effort: a missing .env is not an error
    let _ = dotenvy::dotenv();
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read `{path}`: {e}"))?;
            SchedulerConfig::from_json_str(&raw)
        }
        Err(_) => Ok(SchedulerConfig::host_defaults()),
    }
}
