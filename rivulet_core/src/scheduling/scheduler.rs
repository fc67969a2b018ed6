//! Per-task event loop
//!
//! A [`Scheduler`] merges two event sources into one dispatch point:
//!
//! - **Timers** it owns, polled when their deadline is reached
//! - **Work tokens** pushed onto a bounded notification queue from any
//!   context through a [`TaskHandle`]
//!
//! Each iteration waits on the queue until the nearest timer deadline (capped
//! by `max_wait_ms`). Queue traffic is drained at most `burst_limit` items per
//! wait cycle, so an overdue timer is serviced within that many queue items
//! even while the queue is flooded.
//!
//! The scheduler and everything registered with it are `!Send`: build the
//! object graph on the thread that runs the loop, see [`spawn_task`].

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

use super::config::SchedulerConfig;
use super::timer::TimerSource;
use crate::communication::{AsyncFlow, Requestable};
use crate::core::{ClockRef, SystemClock};
use crate::error::{RivuletError, RivuletResult};

static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchedulerId(u64);

impl SchedulerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index used by [`SchedulerHandle::stop`] to interrupt a blocking wait
const NUDGE_INDEX: u32 = u32::MAX;

/// Stable handle to a requestable registered with one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkToken {
    scheduler: SchedulerId,
    index: u32,
}

impl WorkToken {
    pub fn scheduler(&self) -> SchedulerId {
        self.scheduler
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    fn nudge(scheduler: SchedulerId) -> Self {
        Self {
            scheduler,
            index: NUDGE_INDEX,
        }
    }
}

/// Something that routes its "has pending work" notifications to a task
pub trait Wakeable {
    /// Attach to the task behind `handle`; `token` identifies this object there
    fn bind_task(&self, handle: TaskHandle, token: WorkToken) -> RivuletResult<()>;

    /// True while work is buffered that a dispatch would consume
    ///
    /// Polled by the scheduler after a wake was lost to a full queue.
    fn has_backlog(&self) -> bool {
        false
    }
}

/// A registered object that is also bound to the loop's wakes
trait ObservedWork: Wakeable + Requestable {}

impl<W: Wakeable + Requestable> ObservedWork for W {}

/// Lock-free counters shared by a loop and its handles
#[derive(Debug, Default)]
struct LoopCounters {
    iterations: AtomicU64,
    timer_dispatches: AtomicU64,
    work_dispatches: AtomicU64,
    invalid_tokens: AtomicU64,
    queue_overflows: AtomicU64,
    timing_violations: AtomicU64,
    recovered_wakes: AtomicU64,
}

/// Snapshot of a scheduler's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub iterations: u64,
    pub timer_dispatches: u64,
    pub work_dispatches: u64,
    pub invalid_tokens: u64,
    pub queue_overflows: u64,
    pub timing_violations: u64,
    /// Backlogged work dispatched after its wake was lost to a full queue
    pub recovered_wakes: u64,
}

impl LoopCounters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            iterations: self.iterations.load(Ordering::Relaxed),
            timer_dispatches: self.timer_dispatches.load(Ordering::Relaxed),
            work_dispatches: self.work_dispatches.load(Ordering::Relaxed),
            invalid_tokens: self.invalid_tokens.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            timing_violations: self.timing_violations.load(Ordering::Relaxed),
            recovered_wakes: self.recovered_wakes.load(Ordering::Relaxed),
        }
    }
}

/// The thread-safe half of a scheduler
struct LoopShared {
    id: SchedulerId,
    name: String,
    tx: Sender<WorkToken>,
    rx: Receiver<WorkToken>,
    running: AtomicBool,
    /// Set when a wake was dropped; the loop then sweeps its observed work
    wake_lost: AtomicBool,
    counters: LoopCounters,
}

impl LoopShared {
    fn new(config: &SchedulerConfig) -> Arc<Self> {
        let (tx, rx) = channel::bounded(config.queue_depth);
        Arc::new(Self {
            id: SchedulerId::next(),
            name: config.name.clone(),
            tx,
            rx,
            running: AtomicBool::new(true),
            wake_lost: AtomicBool::new(false),
            counters: LoopCounters::default(),
        })
    }
}

/// Enqueues work for one scheduler from any context
#[derive(Clone)]
pub struct TaskHandle {
    shared: Arc<LoopShared>,
}

impl TaskHandle {
    pub fn scheduler_id(&self) -> SchedulerId {
        self.shared.id
    }

    /// Task-context wake; a full queue is logged and counted
    pub fn wake(&self, token: WorkToken) -> bool {
        match self.shared.tx.try_send(token) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.shared.wake_lost.store(true, Ordering::Release);
                self.shared
                    .counters
                    .queue_overflows
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Task '{}' notification queue full, dropped wake for token {}",
                    self.shared.name,
                    token.index
                );
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Interrupt-context wake: never blocks, never logs
    ///
    /// Not strictly lock-free: when the loop is blocked in its wait, the
    /// channel takes a short internal lock to wake it. A wake lost to a full
    /// queue is recovered by the loop, see [`Wakeable::has_backlog`].
    pub fn wake_from_isr(&self, token: WorkToken) -> bool {
        match self.shared.tx.try_send(token) {
            Ok(()) => true,
            Err(_) => {
                self.shared.wake_lost.store(true, Ordering::Release);
                self.shared
                    .counters
                    .queue_overflows
                    .fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("scheduler", &self.shared.id)
            .field("name", &self.shared.name)
            .finish()
    }
}

/// Controls a scheduler from any thread
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<LoopShared>,
}

impl SchedulerHandle {
    /// Ask the loop to return from [`Scheduler::run`] after its current
    /// iteration
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        // Cut a blocking wait short. A full queue wakes the loop anyway.
        let _ = self.shared.tx.try_send(WorkToken::nudge(self.shared.id));
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }

    pub fn task_handle(&self) -> TaskHandle {
        TaskHandle {
            shared: self.shared.clone(),
        }
    }
}

/// What one loop iteration did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// The nearest timer was polled; `fired` is false if its deadline was
    /// not actually reached (e.g. a virtual clock that did not move)
    TimerPolled { id: u32, fired: bool },
    /// This many queue items were taken in one burst
    Work(usize),
    /// The look-ahead horizon passed with nothing to do
    Idle,
}

/// One dispatch decision
enum Dispatch {
    Timer(usize),
    Work(WorkToken),
}

/// Event loop bound to one task
pub struct Scheduler {
    config: SchedulerConfig,
    clock: ClockRef,
    shared: Arc<LoopShared>,
    timers: Vec<Rc<TimerSource>>,
    arena: Vec<Rc<dyn Requestable>>,
    observed: Vec<Rc<dyn ObservedWork>>,
}

impl Scheduler {
    /// Create a scheduler on the system clock
    pub fn new(config: SchedulerConfig) -> RivuletResult<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Create a scheduler reading time from `clock`
    pub fn with_clock(config: SchedulerConfig, clock: ClockRef) -> RivuletResult<Self> {
        config.validate()?;
        let shared = LoopShared::new(&config);
        Ok(Self::from_shared(config, clock, shared))
    }

    fn from_shared(config: SchedulerConfig, clock: ClockRef, shared: Arc<LoopShared>) -> Self {
        log::debug!(
            "Created scheduler '{}' {} (queue depth {}, burst limit {})",
            config.name,
            shared.id,
            config.queue_depth,
            config.burst_limit
        );
        Self {
            config,
            clock,
            shared,
            timers: Vec::new(),
            arena: Vec::new(),
            observed: Vec::new(),
        }
    }

    pub fn id(&self) -> SchedulerId {
        self.shared.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    pub fn task_handle(&self) -> TaskHandle {
        TaskHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Add a requestable to the arena and return the token that wakes it
    pub fn register<R>(&mut self, target: Rc<R>) -> WorkToken
    where
        R: Requestable + 'static,
    {
        let index = self.arena.len() as u32;
        self.arena.push(target);
        WorkToken {
            scheduler: self.shared.id,
            index,
        }
    }

    /// Register `target` and route its notifications to this task
    pub fn observe<W>(&mut self, target: &Rc<W>) -> RivuletResult<WorkToken>
    where
        W: Wakeable + Requestable + 'static,
    {
        let token = self.register(target.clone());
        target.bind_task(self.task_handle(), token)?;
        self.observed.push(target.clone());
        Ok(token)
    }

    /// Take ownership of a timer; only this loop will poll it
    pub fn add_timer(&mut self, timer: &Rc<TimerSource>) -> RivuletResult<()> {
        if timer.claim(self.shared.id)? {
            self.timers.push(timer.clone());
        }
        Ok(())
    }

    /// Create a running timer on this scheduler's clock and own it
    pub fn timer(&mut self, id: u32, interval_ms: u64, repeat: bool) -> RivuletResult<Rc<TimerSource>> {
        let timer = Rc::new(TimerSource::new(id, interval_ms, repeat, self.clock.clone()));
        self.add_timer(&timer)?;
        Ok(timer)
    }

    /// Create a cross-context queue drained by this task
    ///
    /// The flow uses this scheduler's `lock_timeout_ms`.
    pub fn async_flow<T>(&mut self, name: &str, capacity: usize) -> RivuletResult<Rc<AsyncFlow<T>>>
    where
        T: Send + 'static,
    {
        let flow = Rc::new(AsyncFlow::new(name, capacity)?.with_lock_timeout(self.config.lock_timeout()));
        self.observe(&flow)?;
        Ok(flow)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn work_count(&self) -> usize {
        self.arena.len()
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Nearest armed timer as `(index, deadline)`
    fn nearest_timer(&self) -> Option<(usize, u64)> {
        self.timers
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.next_deadline().map(|d| (i, d)))
            .min_by_key(|&(_, d)| d)
    }

    /// Run exactly one iteration of the loop
    pub fn run_once(&mut self) -> Iteration {
        self.shared
            .counters
            .iterations
            .fetch_add(1, Ordering::Relaxed);

        if self.shared.wake_lost.swap(false, Ordering::AcqRel) {
            self.recover_lost_wakes();
        }

        let now = self.clock.now_ms();
        let horizon = now.saturating_add(self.config.max_wait_ms);
        let (deadline, timer) = match self.nearest_timer() {
            Some((index, at)) if at <= horizon => (at, Some(index)),
            _ => (horizon, None),
        };

        if let Some(index) = timer {
            if deadline <= now {
                return self.dispatch(Dispatch::Timer(index));
            }
        }

        let wait = Duration::from_millis(deadline - now);
        match self.shared.rx.recv_timeout(wait) {
            Ok(token) => self.dispatch(Dispatch::Work(token)),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => match timer {
                Some(index) => self.dispatch(Dispatch::Timer(index)),
                None => Iteration::Idle,
            },
        }
    }

    /// Dispatch every observed object still holding work after a lost wake
    fn recover_lost_wakes(&self) {
        let started = self.clock.now_ms();
        let mut recovered = 0u64;
        for target in self.observed.iter().filter(|t| t.has_backlog()) {
            target.request();
            recovered += 1;
        }
        if recovered == 0 {
            return;
        }
        self.shared
            .counters
            .recovered_wakes
            .fetch_add(recovered, Ordering::Relaxed);
        log::debug!(
            "Scheduler '{}' recovered {} lost wake(s)",
            self.config.name,
            recovered
        );
        self.check_budget(started);
    }

    fn dispatch(&mut self, dispatch: Dispatch) -> Iteration {
        let started = self.clock.now_ms();
        let outcome = match dispatch {
            Dispatch::Timer(index) => {
                let timer = self.timers[index].clone();
                let fired = timer.poll();
                if fired {
                    self.shared
                        .counters
                        .timer_dispatches
                        .fetch_add(1, Ordering::Relaxed);
                }
                Iteration::TimerPolled {
                    id: timer.id(),
                    fired,
                }
            }
            Dispatch::Work(first) => {
                self.dispatch_work(first);
                let mut taken = 1;
                while taken < self.config.burst_limit {
                    match self.shared.rx.try_recv() {
                        Ok(token) => {
                            self.dispatch_work(token);
                            taken += 1;
                        }
                        Err(_) => break,
                    }
                }
                Iteration::Work(taken)
            }
        };
        self.check_budget(started);
        outcome
    }

    fn dispatch_work(&self, token: WorkToken) {
        if token.index == NUDGE_INDEX && token.scheduler == self.shared.id {
            return;
        }
        let target = if token.scheduler == self.shared.id {
            self.arena.get(token.index as usize)
        } else {
            None
        };
        match target {
            Some(target) => {
                target.request();
                self.shared
                    .counters
                    .work_dispatches
                    .fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.shared
                    .counters
                    .invalid_tokens
                    .fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "Scheduler '{}' skipped unknown work token {} from scheduler {}",
                    self.config.name,
                    token.index,
                    token.scheduler
                );
            }
        }
    }

    fn check_budget(&self, started_ms: u64) {
        let elapsed = self.clock.now_ms().saturating_sub(started_ms);
        if elapsed > self.config.iteration_budget_ms {
            self.shared
                .counters
                .timing_violations
                .fetch_add(1, Ordering::Relaxed);
            log::warn!(
                "Scheduler '{}' dispatch took {} ms (budget {} ms)",
                self.config.name,
                elapsed,
                self.config.iteration_budget_ms
            );
        }
    }

    /// Loop until [`SchedulerHandle::stop`] is called
    pub fn run(&mut self) {
        log::info!("Scheduler '{}' started", self.config.name);
        while self.is_running() {
            self.run_once();
        }
        log::info!(
            "Scheduler '{}' stopped after {} iterations",
            self.config.name,
            self.stats().iterations
        );
    }

    /// Loop for a bounded wall-clock duration, or until stopped
    pub fn run_for(&mut self, duration: Duration) {
        let until = Instant::now() + duration;
        log::info!(
            "Scheduler '{}' running for {:?}",
            self.config.name,
            duration
        );
        while self.is_running() && Instant::now() < until {
            self.run_once();
        }
    }

    /// Run exactly `n` iterations and return what each one did
    pub fn run_iterations(&mut self, n: usize) -> Vec<Iteration> {
        (0..n).map(|_| self.run_once()).collect()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.shared.id)
            .field("name", &self.config.name)
            .field("timers", &self.timers.len())
            .field("work", &self.arena.len())
            .finish()
    }
}

// ============================================================================
// Task threads
// ============================================================================

/// A scheduler running on its own thread
pub struct TaskJoin {
    handle: SchedulerHandle,
    join: JoinHandle<RivuletResult<()>>,
}

impl TaskJoin {
    pub fn handle(&self) -> &SchedulerHandle {
        &self.handle
    }

    /// Stop the loop and wait for the thread
    pub fn shutdown(self) -> RivuletResult<()> {
        self.handle.stop();
        self.join()
    }

    /// Wait for the thread to finish
    pub fn join(self) -> RivuletResult<()> {
        let name = self.handle.shared.name.clone();
        self.join
            .join()
            .map_err(|_| RivuletError::Other(format!("task '{}' panicked", name)))?
    }
}

/// Spawn a named task thread running a system-clock scheduler
///
/// `setup` runs on the new thread before the loop starts, so the `Rc`-based
/// graph it builds never crosses threads. The returned handle is usable
/// immediately, before `setup` has run.
pub fn spawn_task<F>(config: SchedulerConfig, setup: F) -> RivuletResult<TaskJoin>
where
    F: FnOnce(&mut Scheduler) -> RivuletResult<()> + Send + 'static,
{
    spawn_task_with_clock(config, SystemClock::shared(), setup)
}

/// Like [`spawn_task`] with an explicit clock
pub fn spawn_task_with_clock<F>(
    config: SchedulerConfig,
    clock: ClockRef,
    setup: F,
) -> RivuletResult<TaskJoin>
where
    F: FnOnce(&mut Scheduler) -> RivuletResult<()> + Send + 'static,
{
    config.validate()?;
    let shared = LoopShared::new(&config);
    let handle = SchedulerHandle {
        shared: shared.clone(),
    };
    let thread_name = config.name.clone();

    let join = thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let mut scheduler = Scheduler::from_shared(config, clock, shared);
            if let Err(e) = setup(&mut scheduler) {
                log::error!("Task '{}' setup failed: {}", scheduler.name(), e);
                scheduler.stop();
                return Err(e);
            }
            scheduler.run();
            Ok(())
        })
        .map_err(|e| RivuletError::Spawn(format!("{}: {}", thread_name, e)))?;

    log::info!("Spawned task '{}'", thread_name);
    Ok(TaskJoin { handle, join })
}
