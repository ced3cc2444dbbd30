//! End-to-end scenarios through the public engine API

use geofence_engine::domain::geometry::EARTH_RADIUS_M;
use geofence_engine::domain::types::{Coordinate, EventKind, Geofence, GeofenceEvent};
use geofence_engine::infra::{EngineConfig, Metrics};
use geofence_engine::io::{EventEgress, ManualClock, ReplaySource};
use geofence_engine::services::GeofenceEngine;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

const M_PER_DEG: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

fn replay_engine(track: &str, clock: Arc<ManualClock>) -> GeofenceEngine {
    let source = Arc::new(ReplaySource::parse(track).unwrap());
    GeofenceEngine::with_parts(EngineConfig::default(), source, clock, Arc::new(Metrics::new()))
}

#[tokio::test]
async fn test_replayed_walk_produces_full_lifecycle() {
    let north = |m: f64| m / M_PER_DEG;
    let track = format!(
        "{{\"lat\": {}, \"lon\": 0.0}}\n{{\"lat\": {}, \"lon\": 0.0}}\nnull\n{{\"lat\": {}, \"lon\": 0.0}}\n{{\"lat\": {}, \"lon\": 0.0}}\n",
        north(150.0),
        north(80.0),
        north(50.0),
        north(400.0),
    );
    let clock = Arc::new(ManualClock::new(0));
    let engine = replay_engine(&track, clock.clone());
    engine
        .add_geofence(Geofence::circle("home", "Home", Coordinate::new(0.0, 0.0), 100.0))
        .unwrap();

    let mut events: Vec<GeofenceEvent> = Vec::new();
    for _ in 0..5 {
        if let Ok(batch) = engine.poll_once().await {
            events.extend(batch);
        }
        clock.advance(40_000);
    }

    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Enter, EventKind::Dwell, EventKind::Exit]);
    assert_eq!(events[0].timestamp_ms, 40_000);
    assert_eq!(events[1].timestamp_ms, 120_000);
    assert_eq!(events[2].timestamp_ms, 160_000);
    assert!(events[0].distance_to_boundary_m > 0.0);
    assert!(events[2].distance_to_boundary_m < 0.0);
    assert_eq!(engine.event_log(), events);
    assert!(engine.active_geofences().is_empty());
}

#[test]
fn test_events_carry_geofence_metadata() {
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = replay_engine("", clock);
    let fence = Geofence::polygon(
        "yard",
        "Yard",
        vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.01, 0.01),
            Coordinate::new(0.01, 0.0),
        ],
    )
    .with_metadata("zone", serde_json::json!("north"));
    engine.add_geofence(fence).unwrap();

    let events = engine.process_sample(Coordinate::new(0.005, 0.005));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].geofence_name, "Yard");
    assert_eq!(events[0].metadata["zone"], serde_json::json!("north"));
    assert_eq!(events[0].coordinate, Coordinate::new(0.005, 0.005));
}

#[test]
fn test_event_log_capacity_evicts_oldest() {
    let clock = Arc::new(ManualClock::new(0));
    let config = EngineConfig::default().with_event_log_capacity(Some(3));
    let engine = GeofenceEngine::with_parts(
        config,
        Arc::new(ReplaySource::new(Vec::new())),
        clock.clone(),
        Arc::new(Metrics::new()),
    );
    engine
        .add_geofence(Geofence::circle("a", "A", Coordinate::new(0.0, 0.0), 100.0))
        .unwrap();

    for i in 0..6u64 {
        clock.set(i * 1_000);
        let fix = if i % 2 == 0 { Coordinate::new(0.0, 0.0) } else { Coordinate::new(1.0, 0.0) };
        engine.process_sample(fix);
    }

    let log = engine.event_log();
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].timestamp_ms, 3_000);
    assert_eq!(log[2].timestamp_ms, 5_000);
    assert_eq!(engine.metrics().events_total(EventKind::Enter), 3);
}

#[test]
fn test_egress_subscriber_writes_jsonl() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.jsonl");
    let egress = EventEgress::new(path.to_str().unwrap(), "site-7");

    let clock = Arc::new(ManualClock::new(0));
    let engine = replay_engine("", clock.clone());
    engine
        .add_geofence(Geofence::circle("a", "A", Coordinate::new(0.0, 0.0), 100.0))
        .unwrap();
    engine.subscribe_all(move |event| egress.write_event(event));

    engine.process_sample(Coordinate::new(0.0, 0.0));
    clock.set(5_000);
    engine.process_sample(Coordinate::new(1.0, 0.0));

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> =
        content.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["site"], "site-7");
    assert_eq!(lines[0]["kind"], "enter");
    assert_eq!(lines[1]["kind"], "exit");
    assert_eq!(lines[1]["timestamp_ms"], 5_000);
}

#[tokio::test]
async fn test_shutdown_stops_sampling() {
    let fixes = vec![Some(Coordinate::new(0.0, 0.0)); 1000];
    let config = EngineConfig::default().with_check_interval_ms(5);
    let engine = GeofenceEngine::with_parts(
        config,
        Arc::new(ReplaySource::new(fixes)),
        Arc::new(ManualClock::new(0)),
        Arc::new(Metrics::new()),
    );
    engine
        .add_geofence(Geofence::circle("a", "A", Coordinate::new(0.0, 0.0), 100.0))
        .unwrap();

    engine.start().unwrap();
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(engine.is_inside("a"));

    let metrics = engine.metrics().clone();
    engine.shutdown().await;
    let ticks = metrics.ticks_total();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(metrics.ticks_total(), ticks);
}
