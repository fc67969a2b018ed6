// Integration tests for the coroutine runtime
use std::cell::RefCell;
use std::rc::Rc;

use rivulet_core::communication::Observable;
use rivulet_core::core::{ClockRef, ManualClock};
use rivulet_core::coroutine::{
    Context, Coroutine, CoroutineRegistry, Protothread, RegistryTicker, Resume,
};
use rivulet_core::scheduling::{Scheduler, SchedulerConfig};

const LINK_UP: u32 = 0x01;
const REPORT_SENT: u32 = 0x02;

// ============================================================================
// Wait-until re-entry
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Report {
    #[default]
    WaitLink,
    Send,
    Done,
}

struct Reporter {
    checks: u32,
    log: Rc<RefCell<Vec<String>>>,
}

impl Coroutine for Reporter {
    type Point = Report;

    fn name(&self) -> &str {
        "reporter"
    }

    fn step(&mut self, at: Report, ctx: &mut Context<'_>) -> Resume<Report> {
        match at {
            Report::WaitLink => {
                self.checks += 1;
                Resume::wait_until(ctx.signals().has_bits(LINK_UP), Report::WaitLink, Report::Send)
            }
            Report::Send => {
                self.log.borrow_mut().push(format!("report after {} checks", self.checks));
                ctx.signals().set_bits(REPORT_SENT);
                Resume::yield_to(Report::Done)
            }
            Report::Done => Resume::Exit,
        }
    }
}

#[test]
fn test_wait_until_retests_predicate_each_entry() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
    let id = registry.register(Reporter {
        checks: 0,
        log: log.clone(),
    });
    registry.setup_all();

    for _ in 0..3 {
        registry.loop_all();
    }
    assert!(log.borrow().is_empty());

    registry.signals().set_bits(LINK_UP);
    registry.loop_all();
    assert_eq!(*log.borrow(), vec!["report after 4 checks".to_string()]);
    assert!(registry.signals().has_bits(REPORT_SENT));
    assert!(registry.is_running(id));

    registry.loop_all();
    assert!(registry.is_finished(id));
}

// ============================================================================
// Child coroutines
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Pulse {
    #[default]
    Start,
    High,
}

/// Holds an output high for 30 ms, then exits
struct PulseChild {
    output: Rc<RefCell<Vec<(u64, bool)>>>,
}

impl Coroutine for PulseChild {
    type Point = Pulse;

    fn name(&self) -> &str {
        "pulse"
    }

    fn step(&mut self, at: Pulse, ctx: &mut Context<'_>) -> Resume<Pulse> {
        match at {
            Pulse::Start => {
                self.output.borrow_mut().push((ctx.now_ms(), true));
                ctx.set_timeout(30);
                Resume::Yield(Pulse::High)
            }
            Pulse::High => {
                if !ctx.timeout() {
                    return Resume::Yield(Pulse::High);
                }
                self.output.borrow_mut().push((ctx.now_ms(), false));
                Resume::Exit
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Parent {
    #[default]
    Spawn,
    Wait,
    Rest,
}

/// Fires the child twice with a rest between pulses
struct PulseTrain {
    child: Protothread<PulseChild>,
    pulses: u32,
}

impl Coroutine for PulseTrain {
    type Point = Parent;

    fn name(&self) -> &str {
        "pulse-train"
    }

    fn step(&mut self, at: Parent, ctx: &mut Context<'_>) -> Resume<Parent> {
        match at {
            Parent::Spawn => {
                self.child.restart();
                Resume::Goto(Parent::Wait)
            }
            Parent::Wait => {
                let running = self.child.dispatch(ctx.env());
                Resume::wait_while(running, Parent::Wait, Parent::Rest)
            }
            Parent::Rest => {
                self.pulses += 1;
                if self.pulses == 2 {
                    return Resume::Exit;
                }
                Resume::yield_to(Parent::Spawn)
            }
        }
    }
}

#[test]
fn test_parent_waits_for_child() {
    let manual = ManualClock::shared(0);
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut registry = CoroutineRegistry::new(manual.clone());
    let id = registry.register(PulseTrain {
        child: Protothread::idle(PulseChild {
            output: output.clone(),
        }),
        pulses: 0,
    });

    let mut loops = 0;
    while registry.is_running(id) && loops < 100 {
        registry.loop_all();
        manual.advance(10);
        loops += 1;
    }

    assert!(registry.is_finished(id));
    assert_eq!(
        *output.borrow(),
        vec![(0, true), (30, false), (40, true), (70, false)]
    );
}

// ============================================================================
// Exit / restart
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Retry {
    #[default]
    Attempt,
}

struct Retrier {
    attempts: Rc<RefCell<u32>>,
}

impl Coroutine for Retrier {
    type Point = Retry;

    fn name(&self) -> &str {
        "retrier"
    }

    fn step(&mut self, _at: Retry, ctx: &mut Context<'_>) -> Resume<Retry> {
        *self.attempts.borrow_mut() += 1;
        if *self.attempts.borrow() >= 3 {
            ctx.stop();
        }
        Resume::Restart
    }
}

#[test]
fn test_restart_rewinds_and_context_stop_halts() {
    let attempts = Rc::new(RefCell::new(0));
    let mut registry = CoroutineRegistry::new(ManualClock::shared(0));
    let id = registry.register(Retrier {
        attempts: attempts.clone(),
    });

    for _ in 0..10 {
        registry.loop_all();
    }

    assert_eq!(*attempts.borrow(), 3);
    assert!(!registry.is_running(id));
    assert!(!registry.is_finished(id));

    registry.restart(id);
    registry.loop_all();
    assert_eq!(*attempts.borrow(), 4);
}

// ============================================================================
// Driven from a scheduler
// ============================================================================

#[test]
fn test_timer_ticks_registry() {
    let manual = ManualClock::shared(0);
    let clock: ClockRef = manual.clone();
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut scheduler = Scheduler::with_clock(SchedulerConfig::standard(), clock.clone()).unwrap();
    let registry = Rc::new(RefCell::new(CoroutineRegistry::new(clock)));
    let id = registry.borrow_mut().register(Reporter {
        checks: 0,
        log: log.clone(),
    });
    registry.borrow_mut().setup_all();

    let tick = scheduler.timer(10, 10, true).unwrap();
    tick.subscribe(&Rc::new(RegistryTicker::new(registry.clone())));

    for _ in 0..5 {
        manual.advance(10);
        scheduler.run_once();
    }
    registry.borrow().signals().set_bits(LINK_UP);
    manual.advance(10);
    scheduler.run_once();

    assert_eq!(*log.borrow(), vec!["report after 6 checks".to_string()]);
    assert!(registry.borrow().is_running(id));
}
