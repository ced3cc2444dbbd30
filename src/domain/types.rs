//! Shared types for the geofence engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque key/value bag attached to a geofence and copied into its events
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A WGS-84 position in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    #[inline]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when latitude is in [-90, 90] and longitude in [-180, 180]
    ///
    /// NaN fails both range checks, so non-finite coordinates are never valid.
    #[inline]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lon)
    }
}

/// A named region tested against incoming positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Geofence {
    Circle {
        id: String,
        name: String,
        center: Coordinate,
        radius_m: f64,
        #[serde(default)]
        metadata: Metadata,
    },
    /// Vertices form a closed loop; the last vertex connects back to the first
    Polygon {
        id: String,
        name: String,
        vertices: Vec<Coordinate>,
        #[serde(default)]
        metadata: Metadata,
    },
}

impl Geofence {
    pub fn circle(id: &str, name: &str, center: Coordinate, radius_m: f64) -> Self {
        Geofence::Circle {
            id: id.to_string(),
            name: name.to_string(),
            center,
            radius_m,
            metadata: Metadata::new(),
        }
    }

    pub fn polygon(id: &str, name: &str, vertices: Vec<Coordinate>) -> Self {
        Geofence::Polygon {
            id: id.to_string(),
            name: name.to_string(),
            vertices,
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry (builder style)
    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        match &mut self {
            Geofence::Circle { metadata, .. } | Geofence::Polygon { metadata, .. } => {
                metadata.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn id(&self) -> &str {
        match self {
            Geofence::Circle { id, .. } | Geofence::Polygon { id, .. } => id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Geofence::Circle { name, .. } | Geofence::Polygon { name, .. } => name,
        }
    }

    pub fn metadata(&self) -> &Metadata {
        match self {
            Geofence::Circle { metadata, .. } | Geofence::Polygon { metadata, .. } => metadata,
        }
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Geofence::Circle { .. } => "circle",
            Geofence::Polygon { .. } => "polygon",
        }
    }
}

/// Kind of occupancy change carried by a [`GeofenceEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Exit,
    Dwell,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Enter => "enter",
            EventKind::Exit => "exit",
            EventKind::Dwell => "dwell",
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enter" => Ok(EventKind::Enter),
            "exit" => Ok(EventKind::Exit),
            "dwell" => Ok(EventKind::Dwell),
            other => Err(format!("unknown event kind: {}", other)),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete notification derived from an occupancy change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceEvent {
    pub kind: EventKind,
    pub geofence_id: String,
    pub geofence_name: String,
    /// Sample that produced the event
    pub coordinate: Coordinate,
    /// Engine clock time of the sample (ms)
    pub timestamp_ms: u64,
    /// Signed distance to the boundary in metres (positive = inside)
    pub distance_to_boundary_m: f64,
    pub metadata: Metadata,
}

/// Occupancy status of a single geofence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    #[default]
    Outside,
    Inside,
    Dwelling,
}

impl OccupancyStatus {
    #[inline]
    pub fn is_inside(&self) -> bool {
        !matches!(self, OccupancyStatus::Outside)
    }

    pub fn as_str(&self) -> &str {
        match self {
            OccupancyStatus::Outside => "outside",
            OccupancyStatus::Inside => "inside",
            OccupancyStatus::Dwelling => "dwelling",
        }
    }
}

/// Last accepted position sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinate::new(90.0, 180.0).is_valid());
        assert!(Coordinate::new(-90.0, -180.0).is_valid());
        assert!(!Coordinate::new(90.1, 0.0).is_valid());
        assert!(!Coordinate::new(0.0, -180.5).is_valid());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_event_kind_from_str() {
        assert_eq!("ENTER".parse::<EventKind>().unwrap(), EventKind::Enter);
        assert_eq!("dwell".parse::<EventKind>().unwrap(), EventKind::Dwell);
        assert!("wander".parse::<EventKind>().is_err());
    }

    #[test]
    fn test_geofence_deserialize_tagged() {
        let circle: Geofence = serde_json::from_str(
            r#"{"shape":"circle","id":"home","name":"Home","center":{"lat":1.0,"lon":2.0},"radius_m":50.0}"#,
        )
        .unwrap();
        assert_eq!(circle.id(), "home");
        assert_eq!(circle.shape(), "circle");
        assert!(circle.metadata().is_empty());
    }

    #[test]
    fn test_with_metadata() {
        let fence = Geofence::circle("a", "A", Coordinate::new(0.0, 0.0), 10.0)
            .with_metadata("floor", serde_json::json!(3));
        assert_eq!(fence.metadata().get("floor"), Some(&serde_json::json!(3)));
    }
}
