//! Detection Handlers - Subscription Slot
//!
//! Exactly one handler receives each forensic snapshot. A base handler (usually
//! persistence) sits at the bottom; `push` layers a temporary handler on top
//! (e.g. a live event stream) and the returned guard restores the previous one
//! when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::alerts::AlertOutcome;
use super::types::ForensicSnapshot;

/// Receiver of processed detections
pub trait DetectionHandler: Send + Sync {
    /// Called once per snapshot, before alerts are dispatched
    fn on_snapshot(&self, snapshot: &ForensicSnapshot);

    /// Called once alert dispatch for the snapshot has finished
    fn on_alert_outcome(&self, _snapshot: &ForensicSnapshot, _outcome: &AlertOutcome) {}
}

impl<F> DetectionHandler for F
where
    F: Fn(&ForensicSnapshot) + Send + Sync,
{
    fn on_snapshot(&self, snapshot: &ForensicSnapshot) {
        self(snapshot)
    }
}

type Entry = (u64, Arc<dyn DetectionHandler>);

#[derive(Default)]
pub struct HandlerSlot {
    base: RwLock<Option<Arc<dyn DetectionHandler>>>,
    overlays: RwLock<Vec<Entry>>,
    next_id: AtomicU64,
}

impl HandlerSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace the base handler
    pub fn set_base(&self, handler: Arc<dyn DetectionHandler>) {
        *self.base.write() = Some(handler);
    }

    /// Make `handler` the active one until the guard is dropped
    pub fn push(self: &Arc<Self>, handler: Arc<dyn DetectionHandler>) -> SubscriptionGuard {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.overlays.write().push((id, handler));
        log::debug!("Detection handler {} subscribed", id);

        SubscriptionGuard { slot: Arc::downgrade(self), id }
    }

    /// Handler that receives the next snapshot
    pub fn active(&self) -> Option<Arc<dyn DetectionHandler>> {
        if let Some((_, handler)) = self.overlays.read().last() {
            return Some(Arc::clone(handler));
        }
        self.base.read().clone()
    }

    pub fn overlay_count(&self) -> usize {
        self.overlays.read().len()
    }

    fn remove(&self, id: u64) {
        self.overlays.write().retain(|(entry_id, _)| *entry_id != id);
        log::debug!("Detection handler {} unsubscribed", id);
    }
}

/// Keeps a pushed handler active; dropping it restores the previous handler
#[must_use = "dropping the guard immediately unsubscribes the handler"]
pub struct SubscriptionGuard {
    slot: Weak<HandlerSlot>,
    id: u64,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.remove(self.id);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::forensics;
    use crate::logic::types::{Detection, EventKind};
    use parking_lot::Mutex;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> Arc<dyn DetectionHandler> {
        let log = Arc::clone(log);
        Arc::new(move |_: &ForensicSnapshot| log.lock().push(tag))
    }

    fn deliver(slot: &HandlerSlot) {
        let snapshot = forensics::collect(&Detection::new("d1", EventKind::Accessed, "/nonexistent".into()));
        if let Some(handler) = slot.active() {
            handler.on_snapshot(&snapshot);
        }
    }

    #[test]
    fn test_push_and_restore() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot = HandlerSlot::new();
        slot.set_base(recorder(&log, "persist"));

        deliver(&slot);
        {
            let _stream = slot.push(recorder(&log, "stream"));
            deliver(&slot);
        }
        deliver(&slot);

        assert_eq!(*log.lock(), vec!["persist", "stream", "persist"]);
    }

    #[test]
    fn test_out_of_order_release() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot = HandlerSlot::new();
        slot.set_base(recorder(&log, "base"));

        let first = slot.push(recorder(&log, "first"));
        let second = slot.push(recorder(&log, "second"));
        drop(first);
        deliver(&slot);
        drop(second);
        deliver(&slot);

        assert_eq!(*log.lock(), vec!["second", "base"]);
        assert_eq!(slot.overlay_count(), 0);
    }

    #[test]
    fn test_no_handler() {
        let slot = HandlerSlot::new();
        assert!(slot.active().is_none());
    }

    #[test]
    fn test_guard_outliving_slot() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot = HandlerSlot::new();
        let guard = slot.push(recorder(&log, "x"));
        drop(slot);
        drop(guard);
    }
}
