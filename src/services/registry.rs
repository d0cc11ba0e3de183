//! Listener registry for feedback flow completion callbacks
//!
//! Listeners are held by shared reference and identified by pointer, so the
//! same instance registered twice is notified once. Dispatch iterates a
//! snapshot of the registrations taken under a short read lock:
//! - a listener registered mid-dispatch receives the next dispatch
//! - a listener unregistered mid-dispatch may still receive the in-flight one
//! - listeners may (un)register from inside a callback without deadlock

use crate::domain::feedback::{FeedbackEvents, FeedbackItem};
use crate::domain::types::epoch_ms;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Observer notified when a feedback flow concludes.
///
/// Both callbacks default to doing nothing, so a listener only interested in
/// one flow kind implements just that method. Returning `Err` (or panicking)
/// marks this delivery as failed without affecting other listeners.
pub trait FeedbackFlowListener: Send + Sync {
    /// Called exactly once per detailed flow, with every event captured (possibly none)
    fn on_detailed_feedback_flow_finished(&self, events: FeedbackEvents) -> anyhow::Result<()> {
        let _ = events;
        Ok(())
    }

    /// Called exactly once per arrival feedback submission
    fn on_arrival_experience_feedback_finished(&self, item: &FeedbackItem) -> anyhow::Result<()> {
        let _ = item;
        Ok(())
    }

    /// Name used in logs
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// A listener linked to the registry
#[derive(Clone)]
struct ListenerRegistration {
    listener: Arc<dyn FeedbackFlowListener>,
    registered_at: u64, // epoch ms
}

impl ListenerRegistration {
    fn is(&self, listener: &Arc<dyn FeedbackFlowListener>) -> bool {
        same_listener(&self.listener, listener)
    }
}

/// Compare data pointers only; vtable pointers may differ across codegen units
#[inline]
fn same_listener(a: &Arc<dyn FeedbackFlowListener>, b: &Arc<dyn FeedbackFlowListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Outcome of one dispatch round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Listeners whose callback returned Ok
    pub delivered: usize,
    /// Listeners whose callback returned Err or panicked
    pub failed: usize,
}

impl DispatchReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

type Snapshot = SmallVec<[ListenerRegistration; 4]>;

/// Registered listeners in registration order
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<ListenerRegistration>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self { listeners: RwLock::new(Vec::new()) }
    }

    /// Register a listener. Returns false if this instance is already registered.
    pub fn register(&self, listener: Arc<dyn FeedbackFlowListener>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|r| r.is(&listener)) {
            debug!(listener = %listener.name(), "listener_already_registered");
            return false;
        }

        debug!(listener = %listener.name(), total = %(listeners.len() + 1), "listener_registered");
        listeners.push(ListenerRegistration { listener, registered_at: epoch_ms() });
        true
    }

    /// Unregister a listener. Returns false if it was not registered.
    pub fn unregister(&self, listener: &Arc<dyn FeedbackFlowListener>) -> bool {
        let mut listeners = self.listeners.write();
        let Some(pos) = listeners.iter().position(|r| r.is(listener)) else {
            return false;
        };
        let removed = listeners.remove(pos);

        debug!(
            listener = %listener.name(),
            registered_for_ms = %epoch_ms().saturating_sub(removed.registered_at),
            total = %listeners.len(),
            "listener_unregistered"
        );
        true
    }

    pub fn contains(&self, listener: &Arc<dyn FeedbackFlowListener>) -> bool {
        self.listeners.read().iter().any(|r| r.is(listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notify every listener that a detailed flow finished.
    ///
    /// All listeners share the same event sequence; nothing is copied per listener.
    pub fn notify_detailed_finished(&self, events: &FeedbackEvents) -> DispatchReport {
        self.dispatch("detailed", |listener| {
            listener.on_detailed_feedback_flow_finished(Arc::clone(events))
        })
    }

    /// Notify every listener that an arrival feedback item was submitted
    pub fn notify_arrival_finished(&self, item: &FeedbackItem) -> DispatchReport {
        self.dispatch("arrival", |listener| listener.on_arrival_experience_feedback_finished(item))
    }

    fn snapshot(&self) -> Snapshot {
        self.listeners.read().iter().cloned().collect()
    }

    fn dispatch<F>(&self, flow: &str, notify: F) -> DispatchReport
    where
        F: Fn(&dyn FeedbackFlowListener) -> anyhow::Result<()>,
    {
        let mut report = DispatchReport::default();

        for registration in self.snapshot() {
            let listener = registration.listener.as_ref();
            match catch_unwind(AssertUnwindSafe(|| notify(listener))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!(listener = %listener.name(), flow = %flow, error = %e, "listener_failed");
                }
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        listener = %listener.name(),
                        flow = %flow,
                        panic = %panic_message(panic.as_ref()),
                        "listener_panicked"
                    );
                }
            }
        }

        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feedback::CachedFeedbackEvent;
    use crate::domain::types::SessionId;
    use parking_lot::Mutex;

    /// Records every callback it receives, tagged with its label
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl FeedbackFlowListener for Recorder {
        fn on_detailed_feedback_flow_finished(&self, events: FeedbackEvents) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}:detailed:{}", self.label, events.len()));
            Ok(())
        }

        fn on_arrival_experience_feedback_finished(&self, item: &FeedbackItem) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}:arrival:{}", self.label, item.rating));
            Ok(())
        }
    }

    struct Failing;

    impl FeedbackFlowListener for Failing {
        fn on_detailed_feedback_flow_finished(&self, _events: FeedbackEvents) -> anyhow::Result<()> {
            anyhow::bail!("backend unavailable")
        }
    }

    struct Panicking;

    impl FeedbackFlowListener for Panicking {
        fn on_arrival_experience_feedback_finished(&self, _item: &FeedbackItem) -> anyhow::Result<()> {
            panic!("listener bug");
        }
    }

    fn recorder(label: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn FeedbackFlowListener> {
        Arc::new(Recorder { label, log: Arc::clone(log) })
    }

    fn events(n: usize) -> FeedbackEvents {
        let session = SessionId::new();
        (0..n).map(|_| CachedFeedbackEvent::new(session, "wrong_route", "")).collect::<Vec<_>>().into()
    }

    #[test]
    fn test_register_is_idempotent() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);

        assert!(registry.register(Arc::clone(&a)));
        assert!(!registry.register(Arc::clone(&a)));
        assert_eq!(registry.len(), 1);

        let report = registry.notify_detailed_finished(&events(2));
        assert_eq!(report, DispatchReport { delivered: 1, failed: 0 });
        assert_eq!(*log.lock(), vec!["a:detailed:2"]);
    }

    #[test]
    fn test_distinct_instances_both_registered() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("a", &log));
        registry.register(recorder("a", &log));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        let a = recorder("a", &log);
        assert!(!registry.unregister(&a));

        registry.register(Arc::clone(&a));
        assert!(registry.contains(&a));
        assert!(registry.unregister(&a));
        assert!(!registry.contains(&a));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("first", &log));
        registry.register(recorder("second", &log));
        registry.register(recorder("third", &log));

        registry.notify_arrival_finished(&FeedbackItem::new(5));

        assert_eq!(*log.lock(), vec!["first:arrival:5", "second:arrival:5", "third:arrival:5"]);
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(recorder("before", &log));
        registry.register(Arc::new(Failing));
        registry.register(recorder("after", &log));

        let report = registry.notify_detailed_finished(&events(0));

        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
        assert_eq!(*log.lock(), vec!["before:detailed:0", "after:detailed:0"]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = ListenerRegistry::new();
        registry.register(Arc::new(Panicking));
        registry.register(recorder("after", &log));

        let report = registry.notify_arrival_finished(&FeedbackItem::new(1));

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.attempted(), 2);
        assert_eq!(*log.lock(), vec!["after:arrival:1"]);
    }

    #[test]
    fn test_listeners_share_one_sequence() {
        struct Capture(Mutex<Vec<FeedbackEvents>>);

        impl FeedbackFlowListener for Capture {
            fn on_detailed_feedback_flow_finished(&self, events: FeedbackEvents) -> anyhow::Result<()> {
                self.0.lock().push(events);
                Ok(())
            }
        }

        let registry = ListenerRegistry::new();
        let a = Arc::new(Capture(Mutex::new(Vec::new())));
        let b = Arc::new(Capture(Mutex::new(Vec::new())));
        registry.register(a.clone());
        registry.register(b.clone());

        let sent = events(3);
        registry.notify_detailed_finished(&sent);

        let got_a = a.0.lock()[0].clone();
        let got_b = b.0.lock()[0].clone();
        assert!(Arc::ptr_eq(&got_a, &sent));
        assert!(Arc::ptr_eq(&got_b, &sent));
    }

    #[test]
    fn test_listener_registered_mid_dispatch_joins_next_dispatch() {
        /// Registers a held listener from inside its first callback
        struct Recruiter {
            registry: Arc<ListenerRegistry>,
            recruit: Mutex<Option<Arc<dyn FeedbackFlowListener>>>,
        }

        impl FeedbackFlowListener for Recruiter {
            fn on_arrival_experience_feedback_finished(&self, _item: &FeedbackItem) -> anyhow::Result<()> {
                if let Some(recruit) = self.recruit.lock().take() {
                    self.registry.register(recruit);
                }
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = Arc::new(ListenerRegistry::new());
        let late = recorder("late", &log);
        registry.register(Arc::new(Recruiter {
            registry: Arc::clone(&registry),
            recruit: Mutex::new(Some(Arc::clone(&late))),
        }));

        let in_flight = registry.notify_arrival_finished(&FeedbackItem::new(1));
        assert_eq!(in_flight, DispatchReport { delivered: 1, failed: 0 });
        assert!(log.lock().is_empty());
        assert!(registry.contains(&late));
        assert_eq!(registry.len(), 2);

        let next = registry.notify_arrival_finished(&FeedbackItem::new(2));
        assert_eq!(next, DispatchReport { delivered: 2, failed: 0 });
        assert_eq!(*log.lock(), vec!["late:arrival:2"]);
    }

    #[test]
    fn test_listener_can_unregister_itself_mid_dispatch() {
        struct OneShot {
            registry: Arc<ListenerRegistry>,
            me: Mutex<Option<Arc<dyn FeedbackFlowListener>>>,
            calls: Mutex<usize>,
        }

        impl FeedbackFlowListener for OneShot {
            fn on_arrival_experience_feedback_finished(&self, _item: &FeedbackItem) -> anyhow::Result<()> {
                *self.calls.lock() += 1;
                if let Some(me) = self.me.lock().take() {
                    self.registry.unregister(&me);
                }
                Ok(())
            }
        }

        let registry = Arc::new(ListenerRegistry::new());
        let one_shot = Arc::new(OneShot {
            registry: Arc::clone(&registry),
            me: Mutex::new(None),
            calls: Mutex::new(0),
        });
        let as_listener: Arc<dyn FeedbackFlowListener> = one_shot.clone();
        *one_shot.me.lock() = Some(Arc::clone(&as_listener));
        registry.register(as_listener);

        registry.notify_arrival_finished(&FeedbackItem::new(3));
        registry.notify_arrival_finished(&FeedbackItem::new(3));

        assert_eq!(*one_shot.calls.lock(), 1);
        assert!(registry.is_empty());
    }
}
