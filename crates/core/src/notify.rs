//! Change notification between source maps and the derived maps that read them.
//!
//! The two roles are kept apart: a [`Notifiable`] can be told that cells went
//! stale, and a [`Notifier`] is the subscription list a changing map owns.
//! A derived map plays both roles, but only through these two small pieces.
//!
//! Listeners are held as `Weak` handles so a notifier never keeps its
//! subscribers alive; dropped listeners are pruned on the next fan-out.
//! Fan-out is synchronous and follows subscription order.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

/// How a notifier passes a cell change on to its listeners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Listeners only mark the affected cells dirty and recompute on next read.
    #[default]
    Lazy,
    /// Listeners recompute the affected cells immediately.
    Eager,
}

/// Something whose cached cells can be invalidated by an upstream change.
pub trait Notifiable {
    /// An upstream cell at `(x, y)` changed; mark whatever depends on it dirty.
    fn mark_dirty(&self, x: usize, y: usize);

    /// An upstream cell at `(x, y)` changed; recompute whatever depends on it now.
    fn force_update(&self, x: usize, y: usize);

    /// Recompute every cell now.
    fn force_update_all(&self);
}

/// Subscription list owned by a map whose values can change.
#[derive(Default)]
pub struct Notifier {
    mode: Cell<UpdateMode>,
    listeners: RefCell<Vec<Weak<dyn Notifiable>>>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("mode", &self.mode.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Notifier {
    /// A notifier with no listeners.
    pub fn new(mode: UpdateMode) -> Self {
        Self {
            mode: Cell::new(mode),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Current fan-out mode.
    pub fn mode(&self) -> UpdateMode {
        self.mode.get()
    }

    /// Switches between lazy and eager fan-out.
    pub fn set_mode(&self, mode: UpdateMode) {
        self.mode.set(mode);
    }

    /// Adds `listener` to the end of the list. Returns `false` if it was
    /// already subscribed.
    pub fn subscribe(&self, listener: Weak<dyn Notifiable>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        tracing::debug!(listeners = listeners.len(), "listener subscribed");
        true
    }

    /// Removes `listener`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, listener: &Weak<dyn Notifiable>) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        let removed = listeners.len() != before;
        if removed {
            tracing::debug!(listeners = listeners.len(), "listener unsubscribed");
        }
        removed
    }

    /// Whether `listener` is currently subscribed.
    pub fn is_subscribed(&self, listener: &Weak<dyn Notifiable>) -> bool {
        self.listeners
            .borrow()
            .iter()
            .any(|l| same_listener(l, listener))
    }

    /// Number of live listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|l| l.strong_count() > 0)
            .count()
    }

    /// Announces that cell `(x, y)` changed.
    pub fn notify_cell(&self, x: usize, y: usize) {
        let mode = self.mode.get();
        for listener in self.live_listeners() {
            match mode {
                UpdateMode::Lazy => listener.mark_dirty(x, y),
                UpdateMode::Eager => listener.force_update(x, y),
            }
        }
    }

    /// Announces a bulk change: every listener recomputes its whole grid.
    pub fn notify_all(&self) {
        for listener in self.live_listeners() {
            listener.force_update_all();
        }
    }

    // Upgrades the live listeners and drops dead ones. The list borrow is
    // released before any listener runs, so listeners may (un)subscribe
    // while being notified.
    fn live_listeners(&self) -> Vec<Rc<dyn Notifiable>> {
        let mut listeners = self.listeners.borrow_mut();
        if listeners.is_empty() {
            return Vec::new();
        }
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }
}

fn same_listener(a: &Weak<dyn Notifiable>, b: &Weak<dyn Notifiable>) -> bool {
    a.as_ptr() as *const () == b.as_ptr() as *const ()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call it receives.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
    }

    impl Notifiable for Recorder {
        fn mark_dirty(&self, x: usize, y: usize) {
            self.calls.borrow_mut().push(format!("dirty {x},{y}"));
        }

        fn force_update(&self, x: usize, y: usize) {
            self.calls.borrow_mut().push(format!("force {x},{y}"));
        }

        fn force_update_all(&self) {
            self.calls.borrow_mut().push("force all".to_string());
        }
    }

    fn weak(rc: &Rc<Recorder>) -> Weak<dyn Notifiable> {
        let w: Weak<Recorder> = Rc::downgrade(rc);
        w
    }

    #[test]
    fn lazy_mode_marks_listeners_dirty() {
        let notifier = Notifier::new(UpdateMode::Lazy);
        let rec = Rc::new(Recorder::default());
        notifier.subscribe(weak(&rec));
        notifier.notify_cell(2, 3);
        assert_eq!(*rec.calls.borrow(), vec!["dirty 2,3"]);
    }

    #[test]
    fn eager_mode_forces_listener_updates() {
        let notifier = Notifier::new(UpdateMode::Eager);
        let rec = Rc::new(Recorder::default());
        notifier.subscribe(weak(&rec));
        notifier.notify_cell(1, 0);
        assert_eq!(*rec.calls.borrow(), vec!["force 1,0"]);
    }

    #[test]
    fn notify_all_forces_full_recompute_in_either_mode() {
        for mode in [UpdateMode::Lazy, UpdateMode::Eager] {
            let notifier = Notifier::new(mode);
            let rec = Rc::new(Recorder::default());
            notifier.subscribe(weak(&rec));
            notifier.notify_all();
            assert_eq!(*rec.calls.borrow(), vec!["force all"]);
        }
    }

    #[test]
    fn fan_out_follows_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));

        struct Tagged(&'static str, Rc<RefCell<Vec<&'static str>>>);
        impl Notifiable for Tagged {
            fn mark_dirty(&self, _: usize, _: usize) {
                self.1.borrow_mut().push(self.0);
            }
            fn force_update(&self, _: usize, _: usize) {}
            fn force_update_all(&self) {}
        }

        let notifier = Notifier::new(UpdateMode::Lazy);
        let listeners: Vec<Rc<Tagged>> = ["a", "b", "c"]
            .into_iter()
            .map(|t| Rc::new(Tagged(t, Rc::clone(&log))))
            .collect();
        for l in &listeners {
            let w: Weak<dyn Notifiable> = Rc::downgrade(l) as Weak<Tagged>;
            notifier.subscribe(w);
        }
        notifier.notify_cell(0, 0);
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_subscription_is_rejected() {
        let notifier = Notifier::new(UpdateMode::Lazy);
        let rec = Rc::new(Recorder::default());
        assert!(notifier.subscribe(weak(&rec)));
        assert!(!notifier.subscribe(weak(&rec)));
        assert_eq!(notifier.listener_count(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let notifier = Notifier::new(UpdateMode::Lazy);
        let rec = Rc::new(Recorder::default());
        notifier.subscribe(weak(&rec));
        assert!(notifier.unsubscribe(&weak(&rec)));
        assert!(!notifier.unsubscribe(&weak(&rec)));
        notifier.notify_cell(0, 0);
        assert!(rec.calls.borrow().is_empty());
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let notifier = Notifier::new(UpdateMode::Lazy);
        let rec = Rc::new(Recorder::default());
        notifier.subscribe(weak(&rec));
        drop(rec);
        assert_eq!(notifier.listener_count(), 0);
        notifier.notify_cell(0, 0);
        assert!(notifier.listeners.borrow().is_empty());
    }

    #[test]
    fn set_mode_changes_fan_out() {
        let notifier = Notifier::new(UpdateMode::Lazy);
        let rec = Rc::new(Recorder::default());
        notifier.subscribe(weak(&rec));
        notifier.set_mode(UpdateMode::Eager);
        notifier.notify_cell(4, 4);
        assert_eq!(notifier.mode(), UpdateMode::Eager);
        assert_eq!(*rec.calls.borrow(), vec!["force 4,4"]);
    }

    #[test]
    fn notifier_without_listeners_is_a_no_op() {
        let notifier = Notifier::default();
        notifier.notify_cell(0, 0);
        notifier.notify_all();
        assert_eq!(notifier.listener_count(), 0);
    }
}
