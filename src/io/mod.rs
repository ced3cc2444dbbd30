//! IO modules - collaborators at the edge of the engine
//!
//! - `clock` - monotonic millisecond time source
//! - `position` - position source trait and JSONL track replay
//! - `egress` - geofence events to file (JSONL format)

pub mod clock;
pub mod egress;
pub mod position;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use egress::EventEgress;
pub use position::{PositionSource, ReplaySource};
