//! Ready-made flow stages and sinks
//!
//! Transformations: [`Map`], [`Filter`].
//! Time based: [`Throttle`], [`Debounce`], [`TimeoutFlow`] (all read a [`ClockRef`]).
//! Value based: [`ChangeFlow`].
//! Endpoints: [`LambdaSource`], [`HandlerSink`], [`LastValueSink`], [`BufferedSink`].

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::marker::PhantomData;

use super::source::Source;
use super::traits::{Observable, Requestable, Sink};
use crate::core::ClockRef;
use crate::error::{RivuletError, RivuletResult};

// ============================================================================
// Map / Filter
// ============================================================================

/// Emits `f(value)` for every input
pub struct Map<IN, OUT, F> {
    f: F,
    source: Source<OUT>,
    _input: PhantomData<fn(&IN)>,
}

impl<IN, OUT, F> Map<IN, OUT, F>
where
    F: Fn(&IN) -> OUT,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            source: Source::new(),
            _input: PhantomData,
        }
    }
}

impl<IN, OUT: 'static, F> Sink<IN> for Map<IN, OUT, F>
where
    F: Fn(&IN) -> OUT,
{
    fn on_next(&self, value: &IN) {
        let out = (self.f)(value);
        self.source.emit(&out);
    }
}

impl<IN, OUT: 'static, F> Observable<OUT> for Map<IN, OUT, F> {
    fn source(&self) -> &Source<OUT> {
        &self.source
    }
}

/// Forwards only the inputs accepted by the predicate
pub struct Filter<T, F> {
    predicate: F,
    source: Source<T>,
}

impl<T, F> Filter<T, F>
where
    F: Fn(&T) -> bool,
{
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            source: Source::new(),
        }
    }
}

impl<T: 'static, F> Sink<T> for Filter<T, F>
where
    F: Fn(&T) -> bool,
{
    fn on_next(&self, value: &T) {
        if (self.predicate)(value) {
            self.source.emit(value);
        }
    }
}

impl<T: 'static, F> Observable<T> for Filter<T, F> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

// ============================================================================
// Time based stages
// ============================================================================

/// Leading-edge rate limiter: forwards an input, then drops everything for
/// `interval_ms`
pub struct Throttle<T> {
    clock: ClockRef,
    interval_ms: u64,
    last_emit: Cell<Option<u64>>,
    dropped: Cell<u64>,
    source: Source<T>,
}

impl<T> Throttle<T> {
    pub fn new(clock: ClockRef, interval_ms: u64) -> Self {
        Self {
            clock,
            interval_ms,
            last_emit: Cell::new(None),
            dropped: Cell::new(0),
            source: Source::new(),
        }
    }

    /// Inputs swallowed inside a throttle window
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

impl<T: 'static> Sink<T> for Throttle<T> {
    fn on_next(&self, value: &T) {
        let now = self.clock.now_ms();
        let open = match self.last_emit.get() {
            Some(last) => now.saturating_sub(last) >= self.interval_ms,
            None => true,
        };
        if open {
            self.last_emit.set(Some(now));
            self.source.emit(value);
        } else {
            self.dropped.set(self.dropped.get() + 1);
        }
    }
}

impl<T: 'static> Observable<T> for Throttle<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

/// Forwards an input only after a quiet gap longer than `delay_ms` since the
/// previous input
///
/// Every input restarts the gap, so a steady stream faster than the delay is
/// suppressed entirely.
pub struct Debounce<T> {
    clock: ClockRef,
    delay_ms: u64,
    last_input: Cell<Option<u64>>,
    source: Source<T>,
}

impl<T> Debounce<T> {
    pub fn new(clock: ClockRef, delay_ms: u64) -> Self {
        Self {
            clock,
            delay_ms,
            last_input: Cell::new(None),
            source: Source::new(),
        }
    }
}

impl<T: 'static> Sink<T> for Debounce<T> {
    fn on_next(&self, value: &T) {
        let now = self.clock.now_ms();
        let quiet = match self.last_input.replace(Some(now)) {
            Some(last) => now.saturating_sub(last) > self.delay_ms,
            None => true,
        };
        if quiet {
            self.source.emit(value);
        }
    }
}

impl<T: 'static> Observable<T> for Debounce<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

/// Pass-through stage that emits a fallback value on `request()` when no
/// input arrived for `timeout_ms`
///
/// Typically polled by a timer so a silent producer degrades to a known
/// value, e.g. a motor command of zero.
pub struct TimeoutFlow<T> {
    clock: ClockRef,
    timeout_ms: u64,
    fallback: T,
    last_input: Cell<u64>,
    source: Source<T>,
}

impl<T> TimeoutFlow<T> {
    pub fn new(clock: ClockRef, timeout_ms: u64, fallback: T) -> Self {
        let now = clock.now_ms();
        Self {
            clock,
            timeout_ms,
            fallback,
            last_input: Cell::new(now),
            source: Source::new(),
        }
    }

    /// True when the last input is older than the timeout
    pub fn timed_out(&self) -> bool {
        self.clock.now_ms().saturating_sub(self.last_input.get()) >= self.timeout_ms
    }
}

impl<T: 'static> Sink<T> for TimeoutFlow<T> {
    fn on_next(&self, value: &T) {
        self.last_input.set(self.clock.now_ms());
        self.source.emit(value);
    }
}

impl<T: 'static> Requestable for TimeoutFlow<T> {
    fn request(&self) {
        if self.timed_out() {
            self.source.emit(&self.fallback);
        }
    }
}

impl<T: 'static> Observable<T> for TimeoutFlow<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

// ============================================================================
// Value based stages
// ============================================================================

/// Dead-band filter: emits when the input moved more than `delta` away from
/// the last emitted value
pub struct ChangeFlow<T> {
    delta: f64,
    last_emitted: Cell<Option<T>>,
    latest: Cell<Option<T>>,
    source: Source<T>,
}

impl<T: Copy + Into<f64>> ChangeFlow<T> {
    pub fn new(delta: T) -> Self {
        Self {
            delta: delta.into(),
            last_emitted: Cell::new(None),
            latest: Cell::new(None),
            source: Source::new(),
        }
    }
}

impl<T: Copy + Into<f64> + 'static> Sink<T> for ChangeFlow<T> {
    fn on_next(&self, value: &T) {
        self.latest.set(Some(*value));
        let moved = match self.last_emitted.get() {
            Some(last) => {
                let (last, current): (f64, f64) = (last.into(), (*value).into());
                (last - current).abs() > self.delta
            }
            None => true,
        };
        if moved {
            self.last_emitted.set(Some(*value));
            self.source.emit(value);
        }
    }
}

impl<T: Copy + Into<f64> + 'static> Requestable for ChangeFlow<T> {
    /// Re-emits the most recent input, whether or not it passed the dead band
    fn request(&self) {
        if let Some(latest) = self.latest.get() {
            self.source.emit(&latest);
        }
    }
}

impl<T: 'static> Observable<T> for ChangeFlow<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Pull source that computes its value on every `request()`
pub struct LambdaSource<T, F> {
    producer: F,
    source: Source<T>,
}

impl<T, F> LambdaSource<T, F>
where
    F: Fn() -> T,
{
    pub fn new(producer: F) -> Self {
        Self {
            producer,
            source: Source::new(),
        }
    }
}

impl<T: 'static, F> Requestable for LambdaSource<T, F>
where
    F: Fn() -> T,
{
    fn request(&self) {
        let value = (self.producer)();
        self.source.emit(&value);
    }
}

impl<T: 'static, F> Observable<T> for LambdaSource<T, F> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

/// Sink backed by a closure
pub struct HandlerSink<F> {
    handler: F,
}

impl<F> HandlerSink<F> {
    pub fn new(handler: F) -> Self {
        Self { handler }
    }
}

impl<T, F> Sink<T> for HandlerSink<F>
where
    F: Fn(&T),
{
    fn on_next(&self, value: &T) {
        (self.handler)(value);
    }
}

/// Remembers the most recent value it received
#[derive(Debug)]
pub struct LastValueSink<T> {
    last: RefCell<Option<T>>,
    received: Cell<u64>,
}

impl<T: Clone> LastValueSink<T> {
    pub fn new() -> Self {
        Self {
            last: RefCell::new(None),
            received: Cell::new(0),
        }
    }

    pub fn get(&self) -> Option<T> {
        self.last.borrow().clone()
    }

    /// Remove and return the stored value
    pub fn take(&self) -> Option<T> {
        self.last.borrow_mut().take()
    }

    /// Number of values received since creation
    pub fn received(&self) -> u64 {
        self.received.get()
    }
}

impl<T: Clone> Default for LastValueSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Sink<T> for LastValueSink<T> {
    fn on_next(&self, value: &T) {
        *self.last.borrow_mut() = Some(value.clone());
        self.received.set(self.received.get() + 1);
    }
}

/// Same-context bounded FIFO that keeps the newest `depth` values
///
/// Unlike [`AsyncFlow`](super::AsyncFlow) it has no lock and must only be
/// used from the task that owns it.
#[derive(Debug)]
pub struct BufferedSink<T> {
    queue: RefCell<VecDeque<T>>,
    depth: usize,
    dropped: Cell<u64>,
}

impl<T: Clone> BufferedSink<T> {
    pub fn new(depth: usize) -> RivuletResult<Self> {
        if depth == 0 {
            return Err(RivuletError::invalid_capacity("BufferedSink", depth));
        }
        Ok(Self {
            queue: RefCell::new(VecDeque::with_capacity(depth)),
            depth,
            dropped: Cell::new(0),
        })
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn has_next(&self) -> bool {
        !self.queue.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_next()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Values discarded to make room for newer ones
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }
}

impl<T: Clone> Sink<T> for BufferedSink<T> {
    fn on_next(&self, value: &T) {
        let mut queue = self.queue.borrow_mut();
        if queue.len() == self.depth {
            queue.pop_front();
            self.dropped.set(self.dropped.get() + 1);
            log::warn!(
                "BufferedSink full (depth {}), dropped oldest value",
                self.depth
            );
        }
        queue.push_back(value.clone());
    }
}
