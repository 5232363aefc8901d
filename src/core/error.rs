//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
///
/// Public scheduler operations are total over their inputs: "not found" and
/// "no effect" are reported through boolean returns, never through this
/// type. These variants cover internal fault paths only.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Committing a lease would exceed the ledger's total capacity.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
    /// Resource arithmetic would produce a negative quantity.
    #[error("resource underflow on dimension `{0}`")]
    ResourceUnderflow(String),
    /// The dispatch channel refused the handoff.
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),
    /// Configuration is invalid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
