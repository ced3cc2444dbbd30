//! Evaluation step - applies geometry to a sample and derives events
//!
//! Owns the registry and the occupancy store together so that both are
//! mutated under a single lock by the engine.

use crate::domain::error::ValidationError;
use crate::domain::geometry;
use crate::domain::types::{Coordinate, Geofence, GeofenceEvent};
use crate::services::occupancy::{OccupancyState, OccupancyStore, Transition};
use crate::services::registry::GeofenceRegistry;
use tracing::{debug, warn};

/// Outcome of evaluating one sample
#[derive(Debug, Default)]
pub struct Evaluation {
    /// Events in registry order, Enter before Dwell within a geofence
    pub events: Vec<GeofenceEvent>,
    /// Geofences skipped because their geometry test failed
    pub failures: usize,
}

pub struct Evaluator {
    registry: GeofenceRegistry,
    occupancy: OccupancyStore,
}

impl Evaluator {
    pub fn new(dwell_threshold_ms: u64) -> Self {
        Self { registry: GeofenceRegistry::new(), occupancy: OccupancyStore::new(dwell_threshold_ms) }
    }

    pub fn add(&mut self, fence: Geofence) -> Result<(), ValidationError> {
        let id = fence.id().to_string();
        self.registry.add(fence)?;
        // A stale state can only exist if the id was removed without cleanup
        self.occupancy.remove(&id);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<Geofence> {
        self.occupancy.remove(id);
        self.registry.remove(id)
    }

    pub fn registry(&self) -> &GeofenceRegistry {
        &self.registry
    }

    pub fn occupancy(&self, id: &str) -> Option<OccupancyState> {
        if !self.registry.contains(id) {
            return None;
        }
        Some(self.occupancy.get(id).copied().unwrap_or_default())
    }

    /// Ids of geofences currently Inside or Dwelling, in registry order
    pub fn active_ids(&self) -> Vec<String> {
        self.registry
            .list()
            .iter()
            .filter(|f| self.occupancy.status(f.id()).is_inside())
            .map(|f| f.id().to_string())
            .collect()
    }

    /// Evaluate every geofence against `sample` taken at `now_ms`
    pub fn evaluate(&mut self, sample: Coordinate, now_ms: u64) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for fence in self.registry.list() {
            let reading = geometry::contains(fence, sample)
                .and_then(|inside| Ok((inside, geometry::distance_to_boundary(sample, fence)?)));

            let (inside, distance_m) = match reading {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        geofence_id = %fence.id(),
                        sample = %sample,
                        error = %e,
                        "geofence_evaluation_failed"
                    );
                    evaluation.failures += 1;
                    continue;
                }
            };

            let transition = self.occupancy.apply(fence.id(), inside, now_ms);
            if transition == Transition::None {
                continue;
            }

            for &kind in transition.kinds() {
                debug!(
                    geofence_id = %fence.id(),
                    kind = %kind,
                    distance_m = format!("{:.1}", distance_m),
                    timestamp_ms = %now_ms,
                    "geofence_transition"
                );
                evaluation.events.push(GeofenceEvent {
                    kind,
                    geofence_id: fence.id().to_string(),
                    geofence_name: fence.name().to_string(),
                    coordinate: sample,
                    timestamp_ms: now_ms,
                    distance_to_boundary_m: distance_m,
                    metadata: fence.metadata().clone(),
                });
            }
        }

        evaluation
    }
}
