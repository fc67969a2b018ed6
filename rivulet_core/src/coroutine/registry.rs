//! Round-robin driver for a group of coroutines

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::context::{Env, Signals};
use super::protothread::Protothread;
use super::Coroutine;
use crate::communication::{Requestable, Sink};
use crate::core::ClockRef;
use crate::scheduling::{CoroutineConfig, TimerMsg};

/// Handle to a coroutine inside one registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroutineId(usize);

impl CoroutineId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Type-erased [`Protothread`]
trait Resumable {
    fn name(&self) -> &str;
    fn setup(&mut self, env: Env<'_>);
    fn is_setup(&self) -> bool;
    fn dispatch(&mut self, env: Env<'_>) -> bool;
    fn stop(&mut self);
    fn restart(&mut self);
    fn is_running(&self) -> bool;
    fn is_finished(&self) -> bool;
}

impl<C: Coroutine> Resumable for Protothread<C> {
    fn name(&self) -> &str {
        Protothread::name(self)
    }

    fn setup(&mut self, env: Env<'_>) {
        Protothread::setup(self, env)
    }

    fn is_setup(&self) -> bool {
        Protothread::is_setup(self)
    }

    fn dispatch(&mut self, env: Env<'_>) -> bool {
        Protothread::dispatch(self, env)
    }

    fn stop(&mut self) {
        Protothread::stop(self)
    }

    fn restart(&mut self) {
        Protothread::restart(self)
    }

    fn is_running(&self) -> bool {
        Protothread::is_running(self)
    }

    fn is_finished(&self) -> bool {
        Protothread::is_finished(self)
    }
}

/// Explicit registry of coroutines, owned by the program entry point
///
/// `loop_all` resumes every running coroutine once, in registration order,
/// with no fairness weighting. A step longer than the configured budget is
/// logged and counted as a timing violation; it is never interrupted.
pub struct CoroutineRegistry {
    clock: ClockRef,
    signals: Signals,
    config: CoroutineConfig,
    entries: Vec<Box<dyn Resumable>>,
    violations: u64,
}

impl CoroutineRegistry {
    pub fn new(clock: ClockRef) -> Self {
        Self::with_config(clock, CoroutineConfig::default())
    }

    pub fn with_config(clock: ClockRef, config: CoroutineConfig) -> Self {
        Self {
            clock,
            signals: Signals::new(),
            config,
            entries: Vec::new(),
            violations: 0,
        }
    }

    /// Add a coroutine; it starts running at its entry point
    pub fn register<C: Coroutine>(&mut self, coroutine: C) -> CoroutineId {
        self.register_thread(Protothread::new(coroutine))
    }

    /// Add a prepared protothread, e.g. one created with [`Protothread::idle`]
    pub fn register_thread<C: Coroutine>(&mut self, thread: Protothread<C>) -> CoroutineId {
        let id = CoroutineId(self.entries.len());
        log::debug!("Registered coroutine '{}' as #{}", thread.name(), id.0);
        self.entries.push(Box::new(thread));
        id
    }

    /// Run the setup of every coroutine that has not been set up yet
    pub fn setup_all(&mut self) {
        let env = Env::new(&self.clock, &self.signals);
        for entry in self.entries.iter_mut().filter(|e| !e.is_setup()) {
            log::info!("Setting up coroutine '{}'", entry.name());
            entry.setup(env);
        }
    }

    /// Resume each running coroutine once; returns how many are still running
    pub fn loop_all(&mut self) -> usize {
        let env = Env::new(&self.clock, &self.signals);
        let budget = self.config.step_budget_ms;
        let mut running = 0;
        for entry in &mut self.entries {
            if !entry.is_running() {
                continue;
            }
            let started = env.now_ms();
            if entry.dispatch(env) {
                running += 1;
            }
            let elapsed = env.now_ms().saturating_sub(started);
            if elapsed > budget {
                self.violations += 1;
                log::warn!(
                    "Coroutine '{}' step took {} ms (budget {} ms)",
                    entry.name(),
                    elapsed,
                    budget
                );
            }
        }
        running
    }

    fn entry(&mut self, id: CoroutineId) -> Option<&mut Box<dyn Resumable>> {
        self.entries.get_mut(id.0)
    }

    /// Returns false for an unknown id
    pub fn stop(&mut self, id: CoroutineId) -> bool {
        self.entry(id).map(|e| e.stop()).is_some()
    }

    /// Returns false for an unknown id
    pub fn restart(&mut self, id: CoroutineId) -> bool {
        self.entry(id).map(|e| e.restart()).is_some()
    }

    pub fn is_running(&self, id: CoroutineId) -> bool {
        self.entries.get(id.0).map_or(false, |e| e.is_running())
    }

    pub fn is_finished(&self, id: CoroutineId) -> bool {
        self.entries.get(id.0).map_or(false, |e| e.is_finished())
    }

    pub fn name(&self, id: CoroutineId) -> Option<&str> {
        self.entries.get(id.0).map(|e| e.name())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Signal bits shared by this group
    pub fn signals(&self) -> &Signals {
        &self.signals
    }

    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    /// Steps that exceeded the budget so far
    pub fn violations(&self) -> u64 {
        self.violations
    }
}

impl fmt::Debug for CoroutineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineRegistry")
            .field("coroutines", &self.entries.len())
            .field("signals", &self.signals.bits())
            .field("violations", &self.violations)
            .finish()
    }
}

/// Drives a shared registry from a timer: one `loop_all` per tick
#[derive(Debug, Clone)]
pub struct RegistryTicker {
    registry: Rc<RefCell<CoroutineRegistry>>,
}

impl RegistryTicker {
    pub fn new(registry: Rc<RefCell<CoroutineRegistry>>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Rc<RefCell<CoroutineRegistry>> {
        &self.registry
    }
}

impl Requestable for RegistryTicker {
    fn request(&self) {
        match self.registry.try_borrow_mut() {
            Ok(mut registry) => {
                registry.loop_all();
            }
            Err(_) => log::warn!("Coroutine registry is busy, skipped a tick"),
        }
    }
}

impl Sink<TimerMsg> for RegistryTicker {
    fn on_next(&self, _tick: &TimerMsg) {
        self.request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::coroutine::{Context, Resume};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Count {
        #[default]
        Top,
        Again,
    }

    /// Yields once per invocation and exits after `limit` invocations
    struct Counter {
        label: &'static str,
        runs: Rc<RefCell<Vec<&'static str>>>,
        limit: u32,
        seen: u32,
    }

    impl Coroutine for Counter {
        type Point = Count;

        fn name(&self) -> &str {
            self.label
        }

        fn setup(&mut self, _ctx: &mut Context<'_>) {
            self.runs.borrow_mut().push("setup");
        }

        fn step(&mut self, _at: Count, _ctx: &mut Context<'_>) -> Resume<Count> {
            self.runs.borrow_mut().push(self.label);
            self.seen += 1;
            if self.seen >= self.limit {
                Resume::Exit
            } else {
                Resume::yield_to(Count::Again)
            }
        }
    }

    fn counter(label: &'static str, runs: &Rc<RefCell<Vec<&'static str>>>, limit: u32) -> Counter {
        Counter {
            label,
            runs: runs.clone(),
            limit,
            seen: 0,
        }
    }

    #[test]
    fn test_loop_all_round_robin() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
        let a = registry.register(counter("a", &runs, 2));
        registry.register(counter("b", &runs, 3));

        assert_eq!(registry.loop_all(), 2);
        assert_eq!(registry.loop_all(), 1);
        assert!(registry.is_finished(a));
        assert_eq!(registry.loop_all(), 0);
        assert_eq!(registry.loop_all(), 0);

        assert_eq!(*runs.borrow(), vec!["a", "b", "a", "b", "b"]);
    }

    #[test]
    fn test_setup_runs_once_per_coroutine() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
        registry.register(counter("first", &runs, 1));
        registry.setup_all();
        registry.register(counter("late", &runs, 1));
        registry.setup_all();

        assert_eq!(*runs.borrow(), vec!["setup", "setup"]);
    }

    #[test]
    fn test_stop_restart_by_id() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
        let id = registry.register(counter("worker", &runs, 10));

        assert!(registry.stop(id));
        registry.loop_all();
        assert!(!registry.is_running(id));
        assert!(runs.borrow().is_empty());

        assert!(registry.restart(id));
        registry.loop_all();
        assert!(registry.is_running(id));
        assert_eq!(registry.name(id), Some("worker"));
        assert_eq!(runs.borrow().len(), 1);
    }

    #[test]
    fn test_unknown_id() {
        let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
        let ghost = CoroutineId(3);
        assert!(!registry.stop(ghost));
        assert!(!registry.is_running(ghost));
        assert_eq!(registry.name(ghost), None);
    }

    struct Hog {
        clock: Arc<ManualClock>,
    }

    impl Coroutine for Hog {
        type Point = Count;

        fn name(&self) -> &str {
            "hog"
        }

        fn step(&mut self, _at: Count, _ctx: &mut Context<'_>) -> Resume<Count> {
            self.clock.advance(15);
            Resume::yield_to(Count::Top)
        }
    }

    #[test]
    fn test_slow_step_flagged() {
        let clock = ManualClock::shared(0);
        let mut registry = CoroutineRegistry::new(clock.clone());
        registry.register(Hog {
            clock: clock.clone(),
        });

        registry.loop_all();
        registry.loop_all();

        assert_eq!(registry.violations(), 2);
    }

    #[test]
    fn test_ticker_drives_registry() {
        let runs = Rc::new(RefCell::new(Vec::new()));
        let registry = Rc::new(RefCell::new(CoroutineRegistry::new(ManualClock::shared(0))));
        registry.borrow_mut().register(counter("tick", &runs, 5));
        let ticker = RegistryTicker::new(registry.clone());

        ticker.on_next(&TimerMsg { id: 1 });
        ticker.on_next(&TimerMsg { id: 1 });

        assert_eq!(runs.borrow().len(), 2);
    }
}
