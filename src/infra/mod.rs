//! Concrete adapters: local worker bookkeeping and dispatch channels.

pub mod dispatch;
pub mod workers;

pub use dispatch::{grant_channel, ChannelDispatchSink};
pub use workers::LocalWorkerPool;
