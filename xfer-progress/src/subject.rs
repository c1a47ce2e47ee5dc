use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::Event;

/// A subscriber of progress events. Implementations must be safe to call
/// from the publishing session's thread and must not block for long --
/// the Rich Observer's own mutex is the only lock held across a render.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &Event);
}

/// Per-connection event publisher (§4.F). Fans events out to every
/// attached observer under a short read-lock critical section. Publish is
/// serial with respect to itself, so per-task-id ordering from a single
/// publisher is preserved; cross-subject (cross-session) interleaving is
/// unspecified and observers must tolerate it.
#[derive(Default)]
pub struct Subject {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl Subject {
    pub fn new() -> Self {
        Subject { observers: RwLock::new(Vec::new()) }
    }

    pub fn attach(&self, observer: Arc<dyn Observer>) {
        self.observers.write().unwrap().push(observer);
    }

    /// Detaches by pointer identity -- an observer that compares equal by
    /// contents but is a different `Arc` is not the same subscription.
    pub fn detach(&self, observer: &Arc<dyn Observer>) {
        let mut observers = self.observers.write().unwrap();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
    }

    /// Publishes `event` to every attached observer. A panicking observer
    /// is caught and logged to stderr via `tracing::error`; it never
    /// prevents delivery to the remaining observers.
    pub fn publish(&self, event: Event) {
        let observers = self.observers.read().unwrap().clone();
        for observer in observers {
            let result = catch_unwind(AssertUnwindSafe(|| observer.on_event(&event)));
            if let Err(panic) = result {
                let message = panic_message(&panic);
                error!(task_id = %event.task_id(), "observer panicked while handling event: {message}");
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;

    struct Recorder(Mutex<Vec<String>>);
    impl Observer for Recorder {
        fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(format!("{event:?}"));
        }
    }

    struct Panicker;
    impl Observer for Panicker {
        fn on_event(&self, _event: &Event) {
            panic!("boom");
        }
    }

    #[test]
    fn publish_reaches_all_attached_observers() {
        let subject = Subject::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        subject.attach(recorder.clone());
        subject.publish(Event::task_started(Uuid::new_v4(), "file", 100));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn detach_removes_only_the_matching_identity() {
        let subject = Subject::new();
        let a: Arc<dyn Observer> = Arc::new(Recorder(Mutex::new(Vec::new())));
        let b: Arc<dyn Observer> = Arc::new(Recorder(Mutex::new(Vec::new())));
        subject.attach(a.clone());
        subject.attach(b.clone());
        subject.detach(&a);
        assert_eq!(subject.observers.read().unwrap().len(), 1);
        assert!(Arc::ptr_eq(&subject.observers.read().unwrap()[0], &b));
    }

    #[test]
    fn a_panicking_observer_does_not_block_the_next_one() {
        let subject = Subject::new();
        subject.attach(Arc::new(Panicker));
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        subject.attach(recorder.clone());
        subject.publish(Event::task_started(Uuid::new_v4(), "file", 100));
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }
}
