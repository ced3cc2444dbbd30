//! Domain models - geofence definitions, events and geometry
//!
//! This module contains the canonical data types used throughout the system:
//! - `Geofence` - circle or polygon region with opaque metadata
//! - `GeofenceEvent` - Enter / Exit / Dwell notification
//! - `geometry` - haversine distance and containment tests
//! - `error` - typed validation, geometry and position errors

pub mod error;
pub mod geometry;
pub mod types;

// Re-export commonly used types at module level
pub use error::{EngineError, GeometryError, PositionError, ValidationError};
pub use types::{Coordinate, EventKind, Geofence, GeofenceEvent, OccupancyStatus, PositionSample};
