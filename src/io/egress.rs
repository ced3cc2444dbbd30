//! Event egress - appends dispatched geofence events to a file
//!
//! Events are written in JSONL format (one JSON object per line) to the file
//! specified in config.

use crate::domain::types::GeofenceEvent;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Line written per event
#[derive(Serialize)]
struct EgressRecord<'a> {
    site: &'a str,
    recorded_at: String,
    #[serde(flatten)]
    event: &'a GeofenceEvent,
}

/// Egress writer for geofence events
pub struct EventEgress {
    file_path: String,
    site_id: String,
}

impl EventEgress {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string(), site_id: site_id.to_string() }
    }

    /// Serialize one event as a JSON line
    pub fn to_json(&self, event: &GeofenceEvent) -> serde_json::Result<String> {
        let record = EgressRecord {
            site: &self.site_id,
            recorded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        };
        serde_json::to_string(&record)
    }

    /// Write an event to the egress file
    pub fn write_event(&self, event: &GeofenceEvent) -> anyhow::Result<()> {
        let json = self.to_json(event)?;
        self.append_line(&json)?;
        debug!(
            geofence_id = %event.geofence_id,
            kind = %event.kind,
            "event_egressed"
        );
        Ok(())
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    pub fn file_path(&self) -> &str {
        &self.file_path
    }
}
