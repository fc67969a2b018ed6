//! Named value cells
//!
//! A [`ValueFlow`] stores the last value pushed into it and re-emits it on
//! [`Requestable::request`]. Whether a push also emits is decided by its
//! [`EmitPolicy`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::source::Source;
use super::traits::{Observable, Requestable, Sink};

/// When a push into a [`ValueFlow`] is forwarded to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitPolicy {
    /// Every push emits
    #[default]
    Always,
    /// A push emits only if it differs from the stored value
    OnChange,
}

/// Typed memory cell that is both a sink and a source
pub struct ValueFlow<T> {
    name: String,
    value: RefCell<T>,
    policy: Cell<EmitPolicy>,
    source: Source<T>,
}

impl<T: Clone + PartialEq + 'static> ValueFlow<T> {
    /// Cell that emits on every push
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self::with_policy(name, initial, EmitPolicy::Always)
    }

    /// Cell that emits only when a push changes the value
    pub fn on_change(name: impl Into<String>, initial: T) -> Self {
        Self::with_policy(name, initial, EmitPolicy::OnChange)
    }

    pub fn with_policy(name: impl Into<String>, initial: T, policy: EmitPolicy) -> Self {
        Self {
            name: name.into(),
            value: RefCell::new(initial),
            policy: Cell::new(policy),
            source: Source::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the stored value
    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    /// Push a new value, same as [`Sink::on_next`]
    pub fn set(&self, value: T) {
        self.on_next(&value);
    }

    pub fn policy(&self) -> EmitPolicy {
        self.policy.get()
    }

    pub fn set_policy(&self, policy: EmitPolicy) {
        self.policy.set(policy);
    }

    fn emit_current(&self) {
        let current = self.get();
        self.source.emit(&current);
    }
}

impl<T: Clone + PartialEq + 'static> Sink<T> for ValueFlow<T> {
    fn on_next(&self, value: &T) {
        let changed = {
            let mut current = self.value.borrow_mut();
            let changed = *current != *value;
            *current = value.clone();
            changed
        };

        // A push arriving while this cell dispatches is the echo of a
        // loopback: store it, never re-emit.
        if self.source.is_dispatching() {
            return;
        }

        match self.policy.get() {
            EmitPolicy::Always => self.emit_current(),
            EmitPolicy::OnChange if changed => self.emit_current(),
            EmitPolicy::OnChange => {}
        }
    }
}

impl<T: Clone + PartialEq + 'static> Requestable for ValueFlow<T> {
    fn request(&self) {
        self.emit_current();
    }
}

impl<T: 'static> Observable<T> for ValueFlow<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueFlow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueFlow")
            .field("name", &self.name)
            .field("value", &self.value.borrow())
            .field("policy", &self.policy.get())
            .finish()
    }
}

/// Keep two cells in sync in both directions
///
/// `a` feeds `b` through an owned edge, `b` feeds `a` back through a loopback
/// edge. Echoes stop at the cell that started the update.
pub fn bind<T: Clone + PartialEq + 'static>(a: &Rc<ValueFlow<T>>, b: &Rc<ValueFlow<T>>) {
    a.subscribe(b);
    b.loopback(a);
}
