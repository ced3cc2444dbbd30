//! Location scheduler - periodic sampling loop
//!
//! One loop task per engine. The first sample is taken immediately on start
//! (the first tick of a tokio interval completes at once), then every
//! `check_interval_ms`. Ticks that fall due while a previous tick is still
//! running are skipped, never queued, so two samples are never evaluated
//! concurrently.
//!
//! Cancellation is cooperative: `stop()` clears the run flag and signals the
//! loop through a watch channel. The flag is checked at the top of every
//! iteration.

use crate::domain::error::EngineError;
use crate::services::engine::EngineCore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

/// Handle to one running loop
struct RunHandle {
    running: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

#[derive(Default)]
pub struct Scheduler {
    run: Mutex<Option<RunHandle>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { run: Mutex::new(None) }
    }

    /// Spawn the loop on the current tokio runtime; no-op if already running
    pub fn start(&self, core: Arc<EngineCore>) -> Result<(), EngineError> {
        let mut run = self.run.lock();
        if let Some(handle) = run.as_ref() {
            if handle.running.load(Ordering::SeqCst) && !handle.join.is_finished() {
                debug!("scheduler_already_running");
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = runtime.spawn(run_loop(core, running.clone(), shutdown_rx));

        *run = Some(RunHandle { running, shutdown_tx, join });
        Ok(())
    }

    /// Signal the loop to stop; idempotent and callable from any thread
    ///
    /// Returns the loop's join handle if one was running.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let handle = self.run.lock().take()?;
        handle.running.store(false, Ordering::SeqCst);
        handle.shutdown_tx.send_replace(true);
        Some(handle.join)
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .map(|h| h.running.load(Ordering::SeqCst) && !h.join.is_finished())
            .unwrap_or(false)
    }
}

async fn run_loop(core: Arc<EngineCore>, running: Arc<AtomicBool>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = core.config().check_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(
        check_interval_ms = %period.as_millis(),
        high_accuracy = %core.config().high_accuracy,
        "scheduler_started"
    );

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
        }

        if !running.load(Ordering::SeqCst) {
            break;
        }

        // Acquisition may be abandoned on shutdown; evaluation itself never awaits
        tokio::select! {
            _ = core.poll_once() => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    info!("scheduler_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_without_start_is_noop() {
        let scheduler = Scheduler::new();
        assert!(scheduler.stop().is_none());
        assert!(scheduler.stop().is_none());
        assert!(!scheduler.is_running());
    }
}
