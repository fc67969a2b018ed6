//! Bounded cross-context queue
//!
//! [`AsyncFlow`] is the only sanctioned way to move values from an interrupt
//! handler or another task into a consumer task:
//!
//! - **Producer side** ([`AsyncSender`], [`IsrSender`]): `Send + Sync`, push
//!   into a fixed-capacity ring under a `parking_lot` mutex and wake the
//!   consumer's scheduler
//! - **Consumer side** ([`AsyncFlow`]): lives on the consumer task; its
//!   `request()` drains the ring in FIFO order and emits every element to
//!   local subscribers
//!
//! A full ring discards its oldest element. Task-context pushes wait at most
//! the lock timeout and log every drop; interrupt-context pushes never wait
//! and never log, they only count.
//!
//! ```
//! use std::rc::Rc;
//! use rivulet_core::communication::{AsyncFlow, LastValueSink, Observable, Requestable};
//!
//! let flow = AsyncFlow::<u32>::new("captures", 3).unwrap();
//! let sender = flow.sender();
//! for v in [1, 2, 3, 4] {
//!     sender.push(v);
//! }
//! let last = Rc::new(LastValueSink::new());
//! flow.subscribe(&last);
//! flow.request();
//! assert_eq!(last.received(), 3);
//! assert_eq!(last.get(), Some(4));
//! ```

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use super::source::Source;
use super::traits::{Observable, Requestable, Sink};
use crate::error::{RivuletError, RivuletResult};
use crate::scheduling::{Scheduler, TaskHandle, Wakeable, WorkToken};

/// Default bounded wait for task-context lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(10);

/// Fixed-capacity FIFO ring that evicts its oldest element when full
struct BoundedRing<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    len: usize,
}

impl<T> BoundedRing<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn wrap_inc(&self, index: usize) -> usize {
        if index + 1 == self.capacity() {
            0
        } else {
            index + 1
        }
    }

    /// Append `value`, returning the element evicted to make room
    fn push(&mut self, value: T) -> Option<T> {
        let tail = (self.head + self.len) % self.capacity();
        if self.len == self.capacity() {
            let evicted = self.slots[tail].replace(value);
            self.head = self.wrap_inc(self.head);
            evicted
        } else {
            self.slots[tail] = Some(value);
            self.len += 1;
            None
        }
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let value = self.slots[self.head].take();
        self.head = self.wrap_inc(self.head);
        self.len -= 1;
        value
    }
}

/// Lock-free counters for one flow
#[derive(Debug, Default)]
struct FlowCounters {
    pushed: AtomicU64,
    isr_pushed: AtomicU64,
    delivered: AtomicU64,
    overflows: AtomicU64,
    contention_drops: AtomicU64,
}

/// Snapshot of an [`AsyncFlow`]'s counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AsyncFlowStats {
    /// Values accepted from task context
    pub pushed: u64,
    /// Values accepted from interrupt context
    pub isr_pushed: u64,
    /// Values emitted by the consumer
    pub delivered: u64,
    /// Oldest values discarded because the ring was full
    pub overflows: u64,
    /// Operations abandoned because the lock was not acquired in time
    pub contention_drops: u64,
}

struct Binding {
    handle: TaskHandle,
    token: WorkToken,
}

/// State shared between producers and the consumer
struct Shared<T> {
    name: String,
    capacity: usize,
    ring: Mutex<BoundedRing<T>>,
    binding: OnceLock<Binding>,
    lock_timeout_us: AtomicU64,
    pending: AtomicBool,
    counters: FlowCounters,
}

impl<T> Shared<T> {
    fn lock_timeout(&self) -> Duration {
        Duration::from_micros(self.lock_timeout_us.load(Ordering::Relaxed))
    }

    fn lock(&self) -> Option<MutexGuard<'_, BoundedRing<T>>> {
        self.ring.try_lock_for(self.lock_timeout())
    }

    fn contention(&self) {
        self.counters
            .contention_drops
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Wake the consumer once per batch of pending values
    fn notify(&self, from_isr: bool) {
        let Some(binding) = self.binding.get() else {
            return;
        };
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let queued = if from_isr {
            binding.handle.wake_from_isr(binding.token)
        } else {
            binding.handle.wake(binding.token)
        };
        if !queued {
            // The loop sweeps backlogged flows; a later push may also retry.
            self.pending.store(false, Ordering::Release);
        }
    }
}

/// Consumer end of a cross-context queue
///
/// Not `Send`: it belongs to the task whose scheduler drains it.
pub struct AsyncFlow<T> {
    shared: Arc<Shared<T>>,
    source: Source<T>,
}

impl<T: Send + 'static> AsyncFlow<T> {
    /// Create an unbound flow holding at most `capacity` values
    pub fn new(name: impl Into<String>, capacity: usize) -> RivuletResult<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(RivuletError::invalid_capacity(
                format!("AsyncFlow '{}'", name),
                capacity,
            ));
        }
        Ok(Self {
            shared: Arc::new(Shared {
                name,
                capacity,
                ring: Mutex::new(BoundedRing::new(capacity)),
                binding: OnceLock::new(),
                lock_timeout_us: AtomicU64::new(DEFAULT_LOCK_TIMEOUT.as_micros() as u64),
                pending: AtomicBool::new(false),
                counters: FlowCounters::default(),
            }),
            source: Source::new(),
        })
    }

    /// Set the bounded wait used by task-context pushes and by the drain
    pub fn with_lock_timeout(self, timeout: Duration) -> Self {
        self.shared
            .lock_timeout_us
            .store(timeout.as_micros() as u64, Ordering::Relaxed);
        self
    }

    /// Producer handle for other tasks and interrupt handlers
    pub fn sender(&self) -> AsyncSender<T> {
        AsyncSender {
            shared: self.shared.clone(),
        }
    }

    /// Register with `scheduler` and route notifications to it
    pub fn observe_on(self: &Rc<Self>, scheduler: &mut Scheduler) -> RivuletResult<WorkToken> {
        scheduler.observe(self)
    }
}

impl<T> AsyncFlow<T> {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Values currently buffered
    pub fn len(&self) -> usize {
        self.shared.ring.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bound(&self) -> bool {
        self.shared.binding.get().is_some()
    }

    pub fn stats(&self) -> AsyncFlowStats {
        let c = &self.shared.counters;
        AsyncFlowStats {
            pushed: c.pushed.load(Ordering::Relaxed),
            isr_pushed: c.isr_pushed.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            overflows: c.overflows.load(Ordering::Relaxed),
            contention_drops: c.contention_drops.load(Ordering::Relaxed),
        }
    }

    fn contention_during_drain(&self) {
        self.shared.contention();
        log::warn!(
            "AsyncFlow '{}' drain could not lock the buffer within {:?}, retrying later",
            self.shared.name,
            self.shared.lock_timeout()
        );
        self.shared.notify(false);
    }
}

impl<T: 'static> Requestable for AsyncFlow<T> {
    /// Drain the values buffered when the call started, oldest first
    ///
    /// The lock is taken per element and released before emitting, so
    /// subscribers and producers never contend with a dispatch in progress.
    fn request(&self) {
        self.shared.pending.store(false, Ordering::Release);

        let backlog = match self.shared.lock() {
            Some(ring) => ring.len,
            None => return self.contention_during_drain(),
        };

        for _ in 0..backlog {
            let next = match self.shared.lock() {
                Some(mut ring) => ring.pop(),
                None => return self.contention_during_drain(),
            };
            let Some(value) = next else {
                break;
            };
            self.shared
                .counters
                .delivered
                .fetch_add(1, Ordering::Relaxed);
            self.source.emit(&value);
        }
    }
}

impl<T: 'static> Observable<T> for AsyncFlow<T> {
    fn source(&self) -> &Source<T> {
        &self.source
    }
}

impl<T> Wakeable for AsyncFlow<T> {
    fn bind_task(&self, handle: TaskHandle, token: WorkToken) -> RivuletResult<()> {
        self.shared
            .binding
            .set(Binding { handle, token })
            .map_err(|_| RivuletError::AlreadyBound(self.shared.name.clone()))?;
        log::debug!(
            "AsyncFlow '{}' bound to scheduler {}",
            self.shared.name,
            token.scheduler()
        );
        // Values pushed before binding still need a wake.
        if self.shared.ring.lock().len > 0 {
            self.shared.notify(false);
        }
        Ok(())
    }

    /// A contended ring counts as backlogged so the drain gets to retry
    fn has_backlog(&self) -> bool {
        self.shared.lock().map_or(true, |ring| ring.len > 0)
    }
}

impl<T> fmt::Debug for AsyncFlow<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFlow")
            .field("name", &self.shared.name)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// Producer end of an [`AsyncFlow`], usable from any thread
pub struct AsyncSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for AsyncSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> AsyncSender<T> {
    /// Task-context push: bounded wait, logged drops, then wake the consumer
    pub fn push(&self, value: T) {
        let evicted = match self.shared.lock() {
            Some(mut ring) => ring.push(value),
            None => {
                self.shared.contention();
                log::warn!(
                    "AsyncFlow '{}' lock not acquired within {:?}, value dropped",
                    self.shared.name,
                    self.shared.lock_timeout()
                );
                return;
            }
        };
        self.shared.counters.pushed.fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.shared
                .counters
                .overflows
                .fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "AsyncFlow '{}' full, dropped oldest value",
                self.shared.name
            );
        }
        self.shared.notify(false);
    }

    /// Interrupt-context push: never waits and never logs
    ///
    /// A contended lock drops `value`; a full ring drops the oldest value.
    /// Both only bump counters. The wake goes through
    /// [`TaskHandle::wake_from_isr`], which may briefly lock the channel to
    /// unblock a waiting loop.
    pub fn push_from_isr(&self, value: T) {
        let evicted = match self.shared.ring.try_lock() {
            Some(mut ring) => ring.push(value),
            None => {
                self.shared.contention();
                return;
            }
        };
        self.shared
            .counters
            .isr_pushed
            .fetch_add(1, Ordering::Relaxed);
        if evicted.is_some() {
            self.shared
                .counters
                .overflows
                .fetch_add(1, Ordering::Relaxed);
        }
        self.shared.notify(true);
    }

    /// Sink view of the interrupt path
    pub fn from_isr(&self) -> IsrSender<T> {
        IsrSender {
            inner: self.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl<T: Clone> Sink<T> for AsyncSender<T> {
    fn on_next(&self, value: &T) {
        self.push(value.clone());
    }
}

impl<T> fmt::Debug for AsyncSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncSender")
            .field("name", &self.shared.name)
            .finish()
    }
}

/// [`AsyncSender`] whose [`Sink`] impl uses the interrupt path
pub struct IsrSender<T> {
    inner: AsyncSender<T>,
}

impl<T> Clone for IsrSender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> Sink<T> for IsrSender<T> {
    fn on_next(&self, value: &T) {
        self.inner.push_from_isr(value.clone());
    }
}
