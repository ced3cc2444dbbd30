//! Geofence registry - validated, uniquely keyed definitions
//!
//! Insertion order is preserved and is the iteration order used by the
//! evaluator, so event ordering within a sample is deterministic.

use crate::domain::error::ValidationError;
use crate::domain::types::{Coordinate, Geofence};
use tracing::{debug, info};

/// Ordered collection of geofence definitions
#[derive(Debug, Default)]
pub struct GeofenceRegistry {
    fences: Vec<Geofence>,
}

/// Check a definition on its own, without regard to registry contents
pub fn validate(fence: &Geofence) -> Result<(), ValidationError> {
    let id = fence.id();
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyId);
    }

    let check_coord = |c: &Coordinate| {
        if c.is_valid() {
            Ok(())
        } else {
            Err(ValidationError::CoordinateOutOfRange { id: id.to_string(), lat: c.lat, lon: c.lon })
        }
    };

    match fence {
        Geofence::Circle { center, radius_m, .. } => {
            // NaN fails the comparison and is rejected here too
            if !(*radius_m > 0.0 && radius_m.is_finite()) {
                return Err(ValidationError::InvalidRadius { id: id.to_string(), radius_m: *radius_m });
            }
            check_coord(center)
        }
        Geofence::Polygon { vertices, .. } => {
            if vertices.len() < 3 {
                return Err(ValidationError::TooFewVertices { id: id.to_string(), count: vertices.len() });
            }
            vertices.iter().try_for_each(check_coord)
        }
    }
}

impl GeofenceRegistry {
    pub fn new() -> Self {
        Self { fences: Vec::new() }
    }

    /// Validate and append a definition
    ///
    /// On error the registry is left untouched.
    pub fn add(&mut self, fence: Geofence) -> Result<(), ValidationError> {
        validate(&fence)?;
        if self.contains(fence.id()) {
            return Err(ValidationError::DuplicateId(fence.id().to_string()));
        }

        info!(
            geofence_id = %fence.id(),
            name = %fence.name(),
            shape = %fence.shape(),
            "geofence_added"
        );
        self.fences.push(fence);
        Ok(())
    }

    /// Remove a definition by id; unknown ids are a no-op
    pub fn remove(&mut self, id: &str) -> Option<Geofence> {
        let idx = self.fences.iter().position(|f| f.id() == id);
        match idx {
            Some(idx) => {
                let fence = self.fences.remove(idx);
                info!(geofence_id = %id, "geofence_removed");
                Some(fence)
            }
            None => {
                debug!(geofence_id = %id, "geofence_remove_unknown");
                None
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Geofence> {
        self.fences.iter().find(|f| f.id() == id)
    }

    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Definitions in insertion order
    #[inline]
    pub fn list(&self) -> &[Geofence] {
        &self.fences
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(id: &str) -> Geofence {
        Geofence::circle(id, id, Coordinate::new(10.0, 20.0), 50.0)
    }

    #[test]
    fn test_add_and_list_preserves_order() {
        let mut registry = GeofenceRegistry::new();
        registry.add(circle("b")).unwrap();
        registry.add(circle("a")).unwrap();
        registry.add(circle("c")).unwrap();

        let ids: Vec<&str> = registry.list().iter().map(|f| f.id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = GeofenceRegistry::new();
        registry.add(circle("home")).unwrap();
        let err = registry.add(circle("home")).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateId("home".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut registry = GeofenceRegistry::new();
        assert_eq!(registry.add(circle("  ")).unwrap_err(), ValidationError::EmptyId);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_invalid_radius_rejected() {
        let mut registry = GeofenceRegistry::new();
        for radius in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let fence = Geofence::circle("r", "r", Coordinate::new(0.0, 0.0), radius);
            assert!(matches!(registry.add(fence), Err(ValidationError::InvalidRadius { .. })));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_polygon_vertex_count() {
        let mut registry = GeofenceRegistry::new();
        let two = Geofence::polygon("p", "p", vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)]);
        assert_eq!(
            registry.add(two).unwrap_err(),
            ValidationError::TooFewVertices { id: "p".to_string(), count: 2 }
        );

        let three = Geofence::polygon(
            "p",
            "p",
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0), Coordinate::new(0.0, 1.0)],
        );
        assert!(registry.add(three).is_ok());
    }

    #[test]
    fn test_out_of_range_coordinate_rejected() {
        let mut registry = GeofenceRegistry::new();
        let fence = Geofence::circle("x", "x", Coordinate::new(91.0, 0.0), 10.0);
        assert!(matches!(registry.add(fence), Err(ValidationError::CoordinateOutOfRange { .. })));

        let poly = Geofence::polygon(
            "y",
            "y",
            vec![Coordinate::new(0.0, 0.0), Coordinate::new(0.0, 181.0), Coordinate::new(1.0, 0.0)],
        );
        assert!(matches!(registry.add(poly), Err(ValidationError::CoordinateOutOfRange { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = GeofenceRegistry::new();
        registry.add(circle("a")).unwrap();
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.remove("never").is_none());
        assert!(registry.is_empty());
    }
}
