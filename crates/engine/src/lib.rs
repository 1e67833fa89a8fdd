//! Event fan-out engine: event table, audience and channel resolution,
//! message composition, result aggregation and the reminder scheduler.

pub mod aggregator;
pub mod audience;
pub mod channel;
pub mod composer;
pub mod events;
pub mod ledger;
pub mod memory;
pub mod router;
pub mod scheduler;
pub mod store;
