//! Round-robin polling of pull sources
//!
//! A [`Poller`] owns a repeating timer on a scheduler and, on every tick,
//! calls `request()` on the next target in its list. With `n` targets and an
//! interval `i`, each target is refreshed every `n * i` ms.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::scheduler::Scheduler;
use super::timer::{TimerMsg, TimerSource};
use crate::communication::{Observable, Requestable, Sink, ValueFlow};
use crate::error::RivuletResult;

/// Timer-driven round-robin over requestables, gated by a run flag
pub struct Poller {
    timer: Weak<TimerSource>,
    targets: RefCell<Vec<Rc<dyn Requestable>>>,
    next: Cell<usize>,
    run: Rc<ValueFlow<bool>>,
}

impl Poller {
    /// Create a poller ticking every `interval_ms` on `scheduler`
    pub fn new(scheduler: &mut Scheduler, timer_id: u32, interval_ms: u64) -> RivuletResult<Rc<Self>> {
        let timer = scheduler.timer(timer_id, interval_ms, true)?;
        let poller = Rc::new(Self {
            timer: Rc::downgrade(&timer),
            targets: RefCell::new(Vec::new()),
            next: Cell::new(0),
            run: Rc::new(ValueFlow::on_change("poller.run", true)),
        });
        timer.subscribe(&poller);
        Ok(poller)
    }

    /// Append a target to the rotation
    pub fn add<R>(&self, target: Rc<R>) -> &Self
    where
        R: Requestable + 'static,
    {
        self.targets.borrow_mut().push(target);
        self
    }

    /// Run flag; polling pauses while it holds `false`
    pub fn run_flag(&self) -> &Rc<ValueFlow<bool>> {
        &self.run
    }

    pub fn len(&self) -> usize {
        self.targets.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change the tick interval from the next re-arm on
    pub fn set_interval(&self, interval_ms: u64) {
        if let Some(timer) = self.timer.upgrade() {
            timer.set_interval(interval_ms);
        }
    }
}

impl Sink<TimerMsg> for Poller {
    fn on_next(&self, _tick: &TimerMsg) {
        if !self.run.get() {
            return;
        }
        let target = {
            let targets = self.targets.borrow();
            if targets.is_empty() {
                return;
            }
            let index = self.next.get() % targets.len();
            self.next.set(index + 1);
            targets[index].clone()
        };
        target.request();
    }
}
