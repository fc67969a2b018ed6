//! Observer vocabulary shared by every dataflow stage
//!
//! - [`Sink`]: absorbs pushed values
//! - [`Requestable`]: can be asked to (re-)emit its state
//! - [`Observable`]: owns a [`Source`] and exposes the subscribe/connect operations
//! - [`Flow`]: anything that is both a sink of `IN` and an observable of `OUT`

use std::rc::Rc;

use super::operators::HandlerSink;
use super::source::{Source, Subscription};

/// Receives values pushed by a source
///
/// Dispatch is synchronous and happens on the emitter's context, so
/// implementations use interior mutability for their state.
pub trait Sink<T> {
    fn on_next(&self, value: &T);
}

/// Pull side of the dataflow: asked to emit its current or buffered state
pub trait Requestable {
    fn request(&self);
}

/// Something that distributes values of type `T` to subscribers
pub trait Observable<T: 'static> {
    /// The subscription point of this stage
    fn source(&self) -> &Source<T>;

    /// Attach an owned edge; the source keeps `sink` alive
    fn subscribe<S>(&self, sink: &Rc<S>)
    where
        S: Sink<T> + 'static,
        Self: Sized,
    {
        let sink: Rc<dyn Sink<T>> = sink.clone();
        self.source().add(Subscription::Owned(sink));
    }

    /// Attach `flow` and hand it back for further chaining
    ///
    /// ```
    /// use std::rc::Rc;
    /// use rivulet_core::communication::{Map, Observable, ValueFlow};
    ///
    /// let raw = ValueFlow::new("raw", 0i32);
    /// let doubled = raw.pipe(Rc::new(Map::new(|v: &i32| v * 2)));
    /// doubled.on_each(|v| assert_eq!(*v, 42));
    /// raw.set(21);
    /// ```
    fn pipe<F>(&self, flow: Rc<F>) -> Rc<F>
    where
        F: Sink<T> + 'static,
        Self: Sized,
    {
        self.subscribe(&flow);
        flow
    }

    /// Attach a tagged loopback edge that does not keep `sink` alive
    ///
    /// Use this for back edges (a stage feeding something that owns it).
    /// Nested emission through a loopback is refused by the source.
    fn loopback<S>(&self, sink: &Rc<S>)
    where
        S: Sink<T> + 'static,
        Self: Sized,
    {
        let weak: std::rc::Weak<S> = Rc::downgrade(sink);
        let weak: std::rc::Weak<dyn Sink<T>> = weak;
        self.source().add(Subscription::Loopback(weak));
    }

    /// Attach a closure sink
    fn on_each<F>(&self, handler: F)
    where
        F: Fn(&T) + 'static,
        Self: Sized,
    {
        let sink: Rc<dyn Sink<T>> = Rc::new(HandlerSink::new(handler));
        self.source().add(Subscription::Owned(sink));
    }
}

/// A transformation stage: sink of `IN`, source of `OUT`
pub trait Flow<IN, OUT: 'static>: Sink<IN> + Observable<OUT> {}

impl<IN, OUT: 'static, F> Flow<IN, OUT> for F where F: Sink<IN> + Observable<OUT> {}

impl<T, S> Sink<T> for Rc<S>
where
    S: Sink<T> + ?Sized,
{
    fn on_next(&self, value: &T) {
        (**self).on_next(value)
    }
}

impl<S> Requestable for Rc<S>
where
    S: Requestable + ?Sized,
{
    fn request(&self) {
        (**self).request()
    }
}
