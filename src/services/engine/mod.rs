//! Geofence engine - public lifecycle and query surface
//!
//! The engine is a caller-owned object: construct, register geofences and
//! subscribers, `start()`, `stop()`, and finally `shutdown()`. It coordinates:
//! - The evaluator (registry + occupancy state, one lock)
//! - The dispatcher (subscribers + event log)
//! - The scheduler (periodic position sampling)
//!
//! Tests drive `poll_once()` / `process_sample()` with a `ManualClock`
//! instead of running the scheduler.


use crate::domain::error::{EngineError, PositionError, ValidationError};
use crate::domain::types::{Coordinate, EventKind, Geofence, GeofenceEvent, PositionSample};
use crate::infra::config::EngineConfig;
use crate::infra::metrics::Metrics;
use crate::io::clock::{Clock, SystemClock};
use crate::io::position::PositionSource;
use crate::services::dispatcher::{Callback, Dispatcher, SubscriptionHandle};
use crate::services::evaluator::Evaluator;
use crate::services::occupancy::OccupancyState;
use crate::services::scheduler::Scheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Availability of the position collaborator, as seen by the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionStatus {
    /// No tick has completed yet
    #[default]
    Unknown,
    Available,
    Unavailable { consecutive_failures: u64 },
}

/// Registry, occupancy and last sample, guarded together
struct Timeline {
    evaluator: Evaluator,
    last_sample: Option<PositionSample>,
}

/// State shared between the engine handle and the scheduler task
pub struct EngineCore {
    config: EngineConfig,
    timeline: Mutex<Timeline>,
    /// Held for a whole evaluate + dispatch so batches never interleave
    tick_lock: Mutex<()>,
    dispatcher: Arc<Dispatcher>,
    source: Arc<dyn PositionSource>,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    consecutive_failures: AtomicU64,
    status_tx: watch::Sender<PositionStatus>,
}

impl EngineCore {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// One scheduler tick: acquire a fix, then evaluate it
    ///
    /// A missing fix is "no update this tick": no events, no state change.
    pub async fn poll_once(&self) -> Result<Vec<GeofenceEvent>, PositionError> {
        self.metrics.record_tick();

        let acquired = self.source.current_position(self.config.high_accuracy).await.and_then(|fix| {
            if fix.is_valid() {
                Ok(fix)
            } else {
                self.metrics.record_sample_rejected();
                Err(PositionError::InvalidCoordinate { lat: fix.lat, lon: fix.lon })
            }
        });

        match acquired {
            Ok(fix) => {
                let recovered = self.consecutive_failures.swap(0, Ordering::Relaxed);
                if recovered > 0 {
                    info!(failed_ticks = %recovered, "position_recovered");
                }
                self.status_tx.send_replace(PositionStatus::Available);
                Ok(self.process_sample(fix))
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                self.metrics.record_position_unavailable();
                self.status_tx.send_replace(PositionStatus::Unavailable { consecutive_failures: failures });
                if failures == 1 {
                    warn!(error = %e, "position_unavailable");
                } else {
                    debug!(error = %e, consecutive_failures = %failures, "position_unavailable");
                }
                Err(e)
            }
        }
    }

    /// Evaluate one sample and dispatch the resulting batch
    ///
    /// Out-of-range samples are dropped without touching any state. A sample
    /// arriving while another is still being evaluated or dispatched (including
    /// from inside a subscriber) is skipped, never queued.
    pub fn process_sample(&self, fix: Coordinate) -> Vec<GeofenceEvent> {
        if !fix.is_valid() {
            self.metrics.record_sample_rejected();
            warn!(sample = %fix, "position_sample_rejected");
            return Vec::new();
        }

        let Some(_tick) = self.tick_lock.try_lock() else {
            warn!(sample = %fix, "sample_skipped_tick_in_progress");
            return Vec::new();
        };
        let started = Instant::now();

        let evaluation = {
            let mut timeline = self.timeline.lock();
            // Engine time never runs backwards even if the clock does
            let floor = timeline.last_sample.map(|s| s.timestamp_ms).unwrap_or(0);
            let now_ms = self.clock.now_ms().max(floor);
            timeline.last_sample = Some(PositionSample { coordinate: fix, timestamp_ms: now_ms });
            let evaluation = timeline.evaluator.evaluate(fix, now_ms);
            self.metrics.set_active_geofences(timeline.evaluator.active_ids().len());
            evaluation
        };

        self.metrics.record_sample_evaluated(started.elapsed().as_micros() as u64);
        if evaluation.failures > 0 {
            self.metrics.record_evaluation_failures(evaluation.failures as u64);
        }

        for event in &evaluation.events {
            self.metrics.record_event(event.kind);
            info!(
                geofence_id = %event.geofence_id,
                name = %event.geofence_name,
                kind = %event.kind,
                lat = %event.coordinate.lat,
                lon = %event.coordinate.lon,
                distance_m = format!("{:.1}", event.distance_to_boundary_m),
                timestamp_ms = %event.timestamp_ms,
                "geofence_event"
            );
        }

        let report = self.dispatcher.dispatch(&evaluation.events);
        if report.failures > 0 {
            self.metrics.record_subscriber_failures(report.failures as u64);
        }

        evaluation.events
    }

    /// Engine time for queries, consistent with sample timestamps
    fn now_ms(&self, timeline: &Timeline) -> u64 {
        let floor = timeline.last_sample.map(|s| s.timestamp_ms).unwrap_or(0);
        self.clock.now_ms().max(floor)
    }
}

/// In-process, polling geofence evaluator driven by a host application
pub struct GeofenceEngine {
    core: Arc<EngineCore>,
    scheduler: Scheduler,
}

impl GeofenceEngine {
    /// Engine with a system clock and private metrics
    pub fn new(config: EngineConfig, source: Arc<dyn PositionSource>) -> Self {
        Self::with_parts(config, source, Arc::new(SystemClock::new()), Arc::new(Metrics::new()))
    }

    /// Engine with an injected clock and shared metrics
    pub fn with_parts(
        config: EngineConfig,
        source: Arc<dyn PositionSource>,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        // A zero capacity means no cap
        let log_capacity = config.event_log_capacity.filter(|&cap| cap > 0);
        let (status_tx, _) = watch::channel(PositionStatus::Unknown);
        let core = EngineCore {
            timeline: Mutex::new(Timeline {
                evaluator: Evaluator::new(config.dwell_threshold_ms),
                last_sample: None,
            }),
            tick_lock: Mutex::new(()),
            dispatcher: Arc::new(Dispatcher::new(log_capacity)),
            source,
            clock,
            metrics,
            consecutive_failures: AtomicU64::new(0),
            status_tx,
            config,
        };
        Self { core: Arc::new(core), scheduler: Scheduler::new() }
    }

    /// Begin periodic sampling on the current tokio runtime
    ///
    /// Occupancy carried over from an earlier run is kept, so geofences that
    /// are still occupied do not produce a second Enter.
    pub fn start(&self) -> Result<(), EngineError> {
        self.scheduler.start(self.core.clone())
    }

    /// Halt sampling; occupancy state is preserved. Idempotent
    pub fn stop(&self) {
        if self.scheduler.stop().is_some() {
            info!("engine_stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Stop and wait for the scheduler task to finish
    pub async fn shutdown(self) {
        if let Some(join) = self.scheduler.stop() {
            if let Err(e) = join.await {
                warn!(error = %e, "scheduler_join_failed");
            }
        }
        info!("engine_shutdown");
    }

    /// Validate and register a geofence; it starts `Outside`
    pub fn add_geofence(&self, fence: Geofence) -> Result<(), ValidationError> {
        self.core.timeline.lock().evaluator.add(fence)
    }

    /// Register several geofences, stopping at the first invalid one
    ///
    /// Definitions before the failing one stay registered.
    pub fn add_geofences<I>(&self, fences: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = Geofence>,
    {
        let mut timeline = self.core.timeline.lock();
        for fence in fences {
            timeline.evaluator.add(fence)?;
        }
        Ok(())
    }

    /// Remove a geofence and its occupancy; unknown ids are a no-op
    pub fn remove_geofence(&self, id: &str) -> bool {
        let mut timeline = self.core.timeline.lock();
        let removed = timeline.evaluator.remove(id).is_some();
        self.core.metrics.set_active_geofences(timeline.evaluator.active_ids().len());
        removed
    }

    pub fn is_inside(&self, id: &str) -> bool {
        self.occupancy(id).map(|s| s.status.is_inside()).unwrap_or(false)
    }

    /// Time since the current inside-interval began, or zero
    pub fn dwell_time(&self, id: &str) -> Duration {
        let timeline = self.core.timeline.lock();
        let now_ms = self.core.now_ms(&timeline);
        let dwell_ms = timeline.evaluator.occupancy(id).map(|s| s.dwell_ms(now_ms)).unwrap_or(0);
        Duration::from_millis(dwell_ms)
    }

    /// Last accepted sample, if any
    pub fn current_position(&self) -> Option<PositionSample> {
        self.core.timeline.lock().last_sample
    }

    /// Ids of geofences currently Inside or Dwelling, in registry order
    pub fn active_geofences(&self) -> Vec<String> {
        self.core.timeline.lock().evaluator.active_ids()
    }

    /// Registered definitions in registry order
    pub fn geofences(&self) -> Vec<Geofence> {
        self.core.timeline.lock().evaluator.registry().list().to_vec()
    }

    /// Occupancy of a registered geofence
    pub fn occupancy(&self, id: &str) -> Option<OccupancyState> {
        self.core.timeline.lock().evaluator.occupancy(id)
    }

    /// Subscribe to one event kind
    pub fn subscribe<F>(&self, kind: EventKind, callback: F) -> SubscriptionHandle
    where
        F: Fn(&GeofenceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(callback))
    }

    /// Subscribe to every event kind
    pub fn subscribe_all<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&GeofenceEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(None, Arc::new(callback))
    }

    fn register(&self, kind: Option<EventKind>, callback: Callback) -> SubscriptionHandle {
        let id = self.core.dispatcher.subscribe(kind, callback);
        SubscriptionHandle::new(id, &self.core.dispatcher)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.core.dispatcher.unsubscribe(handle.id())
    }

    /// Snapshot of the event log, oldest first
    pub fn event_log(&self) -> Vec<GeofenceEvent> {
        self.core.dispatcher.event_log()
    }

    /// Watch position availability (updated every tick)
    pub fn position_status(&self) -> watch::Receiver<PositionStatus> {
        self.core.status_tx.subscribe()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.core.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Run a single scheduler tick now
    pub async fn poll_once(&self) -> Result<Vec<GeofenceEvent>, PositionError> {
        self.core.poll_once().await
    }

    /// Evaluate a synthetic sample at the current clock time
    pub fn process_sample(&self, fix: Coordinate) -> Vec<GeofenceEvent> {
        self.core.process_sample(fix)
    }
}

impl Drop for GeofenceEngine {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}
