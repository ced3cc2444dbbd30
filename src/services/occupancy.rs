//! Per-geofence occupancy state machine
//!
//! Each geofence moves through `Outside -> Inside -> Dwelling -> Outside`
//! independently of every other geofence.
//!
//! Key behaviors:
//! - State is created lazily (as `Outside`) on the first evaluation
//! - Dwell fires at most once per continuous inside-interval
//! - With a zero dwell threshold, Enter and Dwell fire on the same sample,
//!   Enter first
//! - Removing a geofence drops its state, so a re-add starts from `Outside`

use crate::domain::types::{EventKind, OccupancyStatus};
use rustc_hash::FxHashMap;

/// Occupancy of a single geofence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OccupancyState {
    pub status: OccupancyStatus,
    /// Sample time of the Enter that opened the current inside-interval
    pub entered_at_ms: Option<u64>,
    /// Whether Dwell already fired for the current inside-interval
    pub dwell_fired: bool,
}

impl OccupancyState {
    /// Time spent inside as of `now_ms`, or 0 when outside
    pub fn dwell_ms(&self, now_ms: u64) -> u64 {
        self.entered_at_ms.map(|t| now_ms.saturating_sub(t)).unwrap_or(0)
    }
}

/// Result of applying one membership reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Enter,
    /// Enter immediately followed by Dwell (zero threshold)
    EnterAndDwell,
    Dwell,
    Exit,
}

impl Transition {
    /// Events produced by this transition, in dispatch order
    pub fn kinds(&self) -> &'static [EventKind] {
        match self {
            Transition::None => &[],
            Transition::Enter => &[EventKind::Enter],
            Transition::EnterAndDwell => &[EventKind::Enter, EventKind::Dwell],
            Transition::Dwell => &[EventKind::Dwell],
            Transition::Exit => &[EventKind::Exit],
        }
    }
}

/// Occupancy states keyed by geofence id
pub struct OccupancyStore {
    states: FxHashMap<String, OccupancyState>,
    dwell_threshold_ms: u64,
}

impl OccupancyStore {
    pub fn new(dwell_threshold_ms: u64) -> Self {
        Self { states: FxHashMap::default(), dwell_threshold_ms }
    }

    /// Apply a membership reading taken at `now_ms`
    pub fn apply(&mut self, id: &str, inside: bool, now_ms: u64) -> Transition {
        let threshold = self.dwell_threshold_ms;
        let state = self.states.entry(id.to_string()).or_default();

        match (state.status, inside) {
            (OccupancyStatus::Outside, false) => Transition::None,
            (OccupancyStatus::Outside, true) => {
                state.status = OccupancyStatus::Inside;
                state.entered_at_ms = Some(now_ms);
                state.dwell_fired = false;

                if threshold == 0 {
                    state.status = OccupancyStatus::Dwelling;
                    state.dwell_fired = true;
                    Transition::EnterAndDwell
                } else {
                    Transition::Enter
                }
            }
            (OccupancyStatus::Inside, true) => {
                let dwell_ms = state.dwell_ms(now_ms);
                if !state.dwell_fired && dwell_ms >= threshold {
                    state.status = OccupancyStatus::Dwelling;
                    state.dwell_fired = true;
                    Transition::Dwell
                } else {
                    Transition::None
                }
            }
            (OccupancyStatus::Dwelling, true) => Transition::None,
            (OccupancyStatus::Inside | OccupancyStatus::Dwelling, false) => {
                *state = OccupancyState::default();
                Transition::Exit
            }
        }
    }

    /// Current state, `None` if the geofence was never evaluated
    pub fn get(&self, id: &str) -> Option<&OccupancyState> {
        self.states.get(id)
    }

    pub fn status(&self, id: &str) -> OccupancyStatus {
        self.states.get(id).map(|s| s.status).unwrap_or_default()
    }

    /// Drop the state for a geofence
    pub fn remove(&mut self, id: &str) {
        self.states.remove(id);
    }

    #[inline]
    pub fn dwell_threshold_ms(&self) -> u64 {
        self.dwell_threshold_ms
    }
}
