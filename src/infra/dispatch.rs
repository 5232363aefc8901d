//! Dispatch handoff over a bounded crossbeam channel.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::core::executor::DispatchSink;
use crate::core::task::LeaseGrant;
use crate::core::SchedulerError;

/// Non-blocking [`DispatchSink`] backed by a bounded channel.
///
/// The scheduling loop must never block, so handoff uses `try_send`: a full
/// or disconnected channel fails the dispatch and the scheduler rolls the
/// grant back for that one task.
#[derive(Debug, Clone)]
pub struct ChannelDispatchSink {
    tx: Sender<LeaseGrant>,
}

/// Create a bounded grant channel: the sink goes to the scheduler, the
/// receiver to the lease driver.
#[must_use]
pub fn grant_channel(depth: usize) -> (ChannelDispatchSink, Receiver<LeaseGrant>) {
    let (tx, rx) = bounded(depth);
    (ChannelDispatchSink { tx }, rx)
}

impl DispatchSink for ChannelDispatchSink {
    fn dispatch(&self, grant: LeaseGrant) -> Result<(), SchedulerError> {
        self.tx.try_send(grant).map_err(|e| match e {
            TrySendError::Full(_) => {
                SchedulerError::DispatchFailed("dispatch channel full".to_string())
            }
            TrySendError::Disconnected(_) => {
                SchedulerError::DispatchFailed("dispatch channel disconnected".to_string())
            }
        })
    }
}
