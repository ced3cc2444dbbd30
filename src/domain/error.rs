//! Error types for the geofence engine
//!
//! None of these are fatal: the worst outcome of any of them is a tick that
//! produces fewer events.

use thiserror::Error;

/// A geofence definition rejected by the registry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("geofence id must not be empty")]
    EmptyId,

    #[error("geofence {0} already registered")]
    DuplicateId(String),

    #[error("geofence {id}: radius must be positive, got {radius_m}")]
    InvalidRadius { id: String, radius_m: f64 },

    #[error("geofence {id}: polygon needs at least 3 vertices, got {count}")]
    TooFewVertices { id: String, count: usize },

    #[error("geofence {id}: coordinate ({lat}, {lon}) out of range")]
    CoordinateOutOfRange { id: String, lat: f64, lon: f64 },
}

/// A geometry computation that produced a non-finite result
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("non-finite coordinate ({lat}, {lon})")]
    NonFiniteCoordinate { lat: f64, lon: f64 },

    #[error("non-finite distance computed")]
    NonFiniteDistance,
}

/// The position collaborator had no fix for this tick
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositionError {
    #[error("position unavailable: {0}")]
    Unavailable(String),

    #[error("position source timed out")]
    Timeout,

    #[error("position ({lat}, {lon}) out of range")]
    InvalidCoordinate { lat: f64, lon: f64 },
}

/// Engine lifecycle failures
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no tokio runtime available to run the scheduler")]
    NoRuntime,

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
