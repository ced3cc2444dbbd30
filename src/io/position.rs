//! Position collaborators
//!
//! The engine never acquires a fix itself; it asks a `PositionSource` once per
//! scheduler tick. A failure means "no update this tick".
//!
//! `ReplaySource` replays a recorded track (JSONL, one fix per line). A line
//! containing `null` stands for a tick where no fix was available.

use crate::domain::error::PositionError;
use crate::domain::types::Coordinate;
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Latest fix; `high_accuracy` asks for the most precise provider available
    async fn current_position(&self, high_accuracy: bool) -> Result<Coordinate, PositionError>;
}

/// Replays a fixed sequence of fixes, one per call
pub struct ReplaySource {
    fixes: Mutex<VecDeque<Option<Coordinate>>>,
}

impl ReplaySource {
    pub fn new(fixes: Vec<Option<Coordinate>>) -> Self {
        Self { fixes: Mutex::new(fixes.into()) }
    }

    /// Parse a JSONL track: `{"lat": .., "lon": ..}` or `null` per line
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let mut fixes = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fix: Option<Coordinate> = serde_json::from_str(line)
                .with_context(|| format!("Invalid track fix on line {}", idx + 1))?;
            fixes.push(fix);
        }
        Ok(Self::new(fixes))
    }

    /// Load a JSONL track file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read track file {}", path.display()))?;
        let source = Self::parse(&content)
            .with_context(|| format!("Failed to parse track file {}", path.display()))?;
        info!(file = %path.display(), fixes = %source.remaining(), "track_loaded");
        Ok(source)
    }

    /// Fixes not yet handed out
    pub fn remaining(&self) -> usize {
        self.fixes.lock().len()
    }
}

#[async_trait]
impl PositionSource for ReplaySource {
    async fn current_position(&self, high_accuracy: bool) -> Result<Coordinate, PositionError> {
        let next = self.fixes.lock().pop_front();
        debug!(high_accuracy = %high_accuracy, "replay_fix_requested");
        match next {
            Some(Some(fix)) => Ok(fix),
            Some(None) => Err(PositionError::Unavailable("no fix recorded for this tick".to_string())),
            None => Err(PositionError::Unavailable("track exhausted".to_string())),
        }
    }
}
