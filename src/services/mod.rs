//! Services - evaluation, dispatch and scheduling
//!
//! - `registry` - validated geofence definitions in insertion order
//! - `occupancy` - per-geofence Outside / Inside / Dwelling state machine
//! - `evaluator` - turns one sample into an ordered batch of events
//! - `dispatcher` - subscriber fan-out and bounded event log
//! - `scheduler` - periodic sampling loop
//! - `engine` - public lifecycle tying the above together

pub mod dispatcher;
pub mod engine;
pub mod evaluator;
pub mod occupancy;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types
pub use dispatcher::SubscriptionHandle;
pub use engine::{GeofenceEngine, PositionStatus};
