//! Event dispatcher - synchronous delivery to subscribers plus an event log
//!
//! For each event the subscribers registered for its kind run first, then the
//! catch-all subscribers, each group in subscription order. A callback that
//! returns an error or panics is logged and skipped; delivery continues.

use crate::domain::types::{EventKind, GeofenceEvent};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Subscriber callback; an `Err` is logged and does not stop delivery
pub type Callback = Arc<dyn Fn(&GeofenceEvent) -> anyhow::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct Subscribers {
    by_kind: FxHashMap<EventKind, Vec<Subscriber>>,
    catch_all: Vec<Subscriber>,
}

/// Counts from one dispatched batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failures: usize,
}

pub struct Dispatcher {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
    log: Mutex<VecDeque<GeofenceEvent>>,
    /// Maximum retained events; oldest are evicted first. `None` = unbounded
    log_capacity: Option<usize>,
}

impl Dispatcher {
    pub fn new(log_capacity: Option<usize>) -> Self {
        Self {
            subscribers: Mutex::new(Subscribers::default()),
            next_id: AtomicU64::new(1),
            log: Mutex::new(VecDeque::new()),
            log_capacity,
        }
    }

    /// Register a callback for one kind, or every kind when `kind` is `None`
    ///
    /// Returns the subscription id.
    pub fn subscribe(&self, kind: Option<EventKind>, callback: Callback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber { id, callback };
        let mut subs = self.subscribers.lock();
        match kind {
            Some(kind) => subs.by_kind.entry(kind).or_default().push(subscriber),
            None => subs.catch_all.push(subscriber),
        }
        debug!(subscription_id = %id, kind = ?kind, "subscriber_added");
        id
    }

    /// Remove a subscription; returns false if it was already gone
    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.catch_all.len() + subs.by_kind.values().map(Vec::len).sum::<usize>();
        subs.catch_all.retain(|s| s.id != id);
        for list in subs.by_kind.values_mut() {
            list.retain(|s| s.id != id);
        }
        let after = subs.catch_all.len() + subs.by_kind.values().map(Vec::len).sum::<usize>();
        let removed = after < before;
        if removed {
            debug!(subscription_id = %id, "subscriber_removed");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        let subs = self.subscribers.lock();
        subs.catch_all.len() + subs.by_kind.values().map(Vec::len).sum::<usize>()
    }

    /// Log and deliver a batch in order
    pub fn dispatch(&self, events: &[GeofenceEvent]) -> DispatchReport {
        let mut report = DispatchReport::default();
        if events.is_empty() {
            return report;
        }

        self.append_log(events);

        for event in events {
            // Snapshot so callbacks may subscribe or unsubscribe without deadlocking
            let targets: Vec<Subscriber> = {
                let subs = self.subscribers.lock();
                subs.by_kind
                    .get(&event.kind)
                    .into_iter()
                    .flatten()
                    .chain(subs.catch_all.iter())
                    .cloned()
                    .collect()
            };

            for subscriber in &targets {
                match catch_unwind(AssertUnwindSafe(|| (subscriber.callback)(event))) {
                    Ok(Ok(())) => report.delivered += 1,
                    Ok(Err(e)) => {
                        report.failures += 1;
                        warn!(
                            subscription_id = %subscriber.id,
                            geofence_id = %event.geofence_id,
                            kind = %event.kind,
                            error = %e,
                            "subscriber_failed"
                        );
                    }
                    Err(panic) => {
                        report.failures += 1;
                        warn!(
                            subscription_id = %subscriber.id,
                            geofence_id = %event.geofence_id,
                            kind = %event.kind,
                            panic = %panic_message(panic.as_ref()),
                            "subscriber_panicked"
                        );
                    }
                }
            }
        }

        report
    }

    fn append_log(&self, events: &[GeofenceEvent]) {
        let mut log = self.log.lock();
        log.extend(events.iter().cloned());
        if let Some(cap) = self.log_capacity {
            while log.len() > cap {
                log.pop_front();
            }
        }
    }

    /// Snapshot of the event log, oldest first
    pub fn event_log(&self) -> Vec<GeofenceEvent> {
        self.log.lock().iter().cloned().collect()
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle returned by `subscribe`; call [`SubscriptionHandle::unsubscribe`] to stop delivery
///
/// Dropping the handle leaves the subscription in place.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    dispatcher: Weak<Dispatcher>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: u64, dispatcher: &Arc<Dispatcher>) -> Self {
        Self { id, dispatcher: Arc::downgrade(dispatcher) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns false if the subscription or the engine is already gone
    pub fn unsubscribe(&self) -> bool {
        match self.dispatcher.upgrade() {
            Some(dispatcher) => dispatcher.unsubscribe(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.subscriber_count())
            .field("log_capacity", &self.log_capacity)
            .finish()
    }
}
