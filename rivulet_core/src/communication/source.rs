//! Fan-out subscription point
//!
//! A [`Source`] keeps an append-only list of subscriptions and delivers each
//! emitted value to all of them, synchronously and in registration order.
//!
//! Forward edges own their subscriber, so a subscriber can never be dropped
//! while still registered. Loopback edges are weak: a dead loopback is
//! detected during dispatch and pruned afterwards.
//!
//! ## Re-entrancy
//!
//! A source that is asked to emit while it is already dispatching refuses the
//! nested emission. The refusal is logged at `warn` and counted, see
//! [`Source::rejected_reentries`]. Subscribing from inside a dispatch is
//! allowed and takes effect from the next emission.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::traits::{Observable, Sink};

/// One registered edge of a [`Source`]
pub enum Subscription<T> {
    /// Forward edge, keeps the subscriber alive
    Owned(Rc<dyn Sink<T>>),
    /// Tagged back edge, does not keep the subscriber alive
    Loopback(Weak<dyn Sink<T>>),
}

impl<T> Subscription<T> {
    fn target(&self) -> Option<Rc<dyn Sink<T>>> {
        match self {
            Subscription::Owned(sink) => Some(sink.clone()),
            Subscription::Loopback(weak) => weak.upgrade(),
        }
    }

    fn is_live(&self) -> bool {
        match self {
            Subscription::Owned(_) => true,
            Subscription::Loopback(weak) => weak.strong_count() > 0,
        }
    }

    /// Whether this edge was registered with [`Observable::loopback`]
    pub fn is_loopback(&self) -> bool {
        matches!(self, Subscription::Loopback(_))
    }
}

/// Clears the dispatching flag even if a subscriber panics
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Ordered, append-only set of subscribers for values of type `T`
pub struct Source<T> {
    subscribers: RefCell<Vec<Subscription<T>>>,
    dispatching: Cell<bool>,
    rejected: Cell<u64>,
    pruned: Cell<u64>,
}

impl<T> Source<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            dispatching: Cell::new(false),
            rejected: Cell::new(0),
            pruned: Cell::new(0),
        }
    }

    pub(crate) fn add(&self, subscription: Subscription<T>) {
        self.subscribers.borrow_mut().push(subscription);
    }

    /// Attach an already type-erased subscriber as an owned edge
    pub fn subscribe_dyn(&self, sink: Rc<dyn Sink<T>>) {
        self.add(Subscription::Owned(sink));
    }

    /// Deliver `value` to every subscriber in registration order
    pub fn emit(&self, value: &T) {
        if self.dispatching.get() {
            self.rejected.set(self.rejected.get() + 1);
            log::warn!(
                "Rejected nested emission on a source that is already dispatching ({} so far)",
                self.rejected.get()
            );
            return;
        }

        let saw_dead_edge = {
            self.dispatching.set(true);
            let _guard = DispatchGuard(&self.dispatching);

            // Subscribers added during this dispatch are not visited.
            let count = self.subscribers.borrow().len();
            let mut saw_dead_edge = false;
            for index in 0..count {
                // The list borrow is released before calling out, so a
                // subscriber may subscribe to this source.
                let target = self.subscribers.borrow()[index].target();
                match target {
                    Some(sink) => sink.on_next(value),
                    None => saw_dead_edge = true,
                }
            }
            saw_dead_edge
        };

        if saw_dead_edge {
            self.prune();
        }
    }

    fn prune(&self) {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(Subscription::is_live);
        let removed = (before - subscribers.len()) as u64;
        self.pruned.set(self.pruned.get() + removed);
        log::debug!("Pruned {} dead loopback edge(s)", removed);
    }

    /// Number of registered edges, including not yet pruned dead loopbacks
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Number of nested emissions refused so far
    pub fn rejected_reentries(&self) -> u64 {
        self.rejected.get()
    }

    /// Number of dead loopback edges removed so far
    pub fn pruned_edges(&self) -> u64 {
        self.pruned.get()
    }

    /// True while [`Source::emit`] is delivering a value
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.get()
    }
}

impl<T> Default for Source<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Source<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("subscribers", &self.subscriber_count())
            .field("dispatching", &self.dispatching.get())
            .field("rejected", &self.rejected.get())
            .finish()
    }
}

impl<T: 'static> Observable<T> for Source<T> {
    fn source(&self) -> &Source<T> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::operators::LastValueSink;

    struct Recorder {
        tag: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Sink<i32> for Recorder {
        fn on_next(&self, value: &i32) {
            self.log.borrow_mut().push(format!("{}:{}", self.tag, value));
        }
    }

    // ========================================================================
    // Dispatch order
    // ========================================================================

    #[test]
    fn test_emit_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let source = Source::new();
        for tag in ["a", "b", "c"] {
            source.subscribe(&Rc::new(Recorder {
                tag,
                log: log.clone(),
            }));
        }

        source.emit(&1);
        source.emit(&2);

        assert_eq!(
            *log.borrow(),
            vec!["a:1", "b:1", "c:1", "a:2", "b:2", "c:2"]
        );
    }

    #[test]
    fn test_emit_without_subscribers() {
        let source: Source<i32> = Source::new();
        source.emit(&7);
        assert_eq!(source.subscriber_count(), 0);
    }

    // ========================================================================
    // Re-entrancy
    // ========================================================================

    struct Reemitter {
        target: RefCell<Option<Rc<Source<i32>>>>,
        seen: Cell<u32>,
    }

    impl Sink<i32> for Reemitter {
        fn on_next(&self, value: &i32) {
            self.seen.set(self.seen.get() + 1);
            if let Some(source) = self.target.borrow().as_ref() {
                source.emit(&(value + 1));
            }
        }
    }

    #[test]
    fn test_nested_emission_rejected() {
        let source = Rc::new(Source::new());
        let sink = Rc::new(Reemitter {
            target: RefCell::new(Some(source.clone())),
            seen: Cell::new(0),
        });
        source.loopback(&sink);

        source.emit(&1);

        assert_eq!(sink.seen.get(), 1);
        assert_eq!(source.rejected_reentries(), 1);
        assert!(!source.is_dispatching());
    }

    struct LateSubscriber {
        source: Rc<Source<i32>>,
        sink: Rc<LastValueSink<i32>>,
        done: Cell<bool>,
    }

    impl Sink<i32> for LateSubscriber {
        fn on_next(&self, _value: &i32) {
            if !self.done.replace(true) {
                self.source.subscribe(&self.sink);
            }
        }
    }

    #[test]
    fn test_subscribe_during_dispatch_applies_next_time() {
        let source = Rc::new(Source::new());
        let late = Rc::new(LastValueSink::new());
        let adder = Rc::new(LateSubscriber {
            source: source.clone(),
            sink: late.clone(),
            done: Cell::new(false),
        });
        source.loopback(&adder);

        source.emit(&1);
        assert_eq!(late.get(), None);

        source.emit(&2);
        assert_eq!(late.get(), Some(2));
    }

    // ========================================================================
    // Loopback lifetime
    // ========================================================================

    #[test]
    fn test_dead_loopback_pruned() {
        let source = Source::new();
        let kept = Rc::new(LastValueSink::new());
        source.subscribe(&kept);
        {
            let temporary = Rc::new(LastValueSink::<i32>::new());
            source.loopback(&temporary);
        }
        assert_eq!(source.subscriber_count(), 2);

        source.emit(&3);

        assert_eq!(kept.get(), Some(3));
        assert_eq!(source.subscriber_count(), 1);
        assert_eq!(source.pruned_edges(), 1);
    }

    #[test]
    fn test_owned_edge_keeps_subscriber_alive() {
        let source = Source::new();
        let sink = Rc::new(LastValueSink::<i32>::new());
        source.subscribe(&sink);
        let weak = Rc::downgrade(&sink);
        drop(sink);

        source.emit(&9);
        let sink = weak.upgrade().expect("source owns the edge");
        assert_eq!(sink.get(), Some(9));
    }
}
