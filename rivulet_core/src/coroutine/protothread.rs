//! A coroutine together with its saved resume point

use std::fmt;

use super::context::{Context, Control, Env};
use super::{Coroutine, Resume};
use crate::scheduling::Deadline;

/// Lifecycle of a [`Protothread`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Stopped from outside or via `Context::stop`; resumable after restart
    Stopped,
    /// Returned [`Resume::Exit`]
    Finished,
}

/// Drives a [`Coroutine`] from its saved point
///
/// Also the building block for child coroutines: a parent keeps a
/// `Protothread` field, calls [`restart`](Self::restart) to spawn it and
/// waits with `Resume::wait_while(child.dispatch(ctx.env()), here, next)`.
pub struct Protothread<C: Coroutine> {
    inner: C,
    point: C::Point,
    state: RunState,
    deadline: Deadline,
    setup_done: bool,
}

impl<C: Coroutine> Protothread<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            point: C::Point::default(),
            state: RunState::Running,
            deadline: Deadline::never(),
            setup_done: false,
        }
    }

    /// Same as [`new`](Self::new) but not running until restarted
    pub fn idle(inner: C) -> Self {
        let mut thread = Self::new(inner);
        thread.state = RunState::Stopped;
        thread
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Run the coroutine's one-time setup; later calls do nothing
    pub fn setup(&mut self, env: Env<'_>) {
        if self.setup_done {
            return;
        }
        self.setup_done = true;
        let mut ctx = Context::new(env, &mut self.deadline);
        self.inner.setup(&mut ctx);
    }

    pub fn is_setup(&self) -> bool {
        self.setup_done
    }

    /// Resume from the saved point until the coroutine yields or ends
    ///
    /// Returns whether the coroutine is still running afterwards.
    pub fn dispatch(&mut self, env: Env<'_>) -> bool {
        if self.state != RunState::Running {
            return false;
        }
        loop {
            let mut ctx = Context::new(env, &mut self.deadline);
            let resume = self.inner.step(self.point, &mut ctx);
            let control = ctx.take_control();

            match control {
                Some(Control::Stop) => {
                    self.state = RunState::Stopped;
                    return false;
                }
                Some(Control::Restart) => {
                    self.reset_point();
                    return true;
                }
                None => {}
            }

            match resume {
                Resume::Goto(next) => self.point = next,
                Resume::Yield(next) => {
                    self.point = next;
                    return true;
                }
                Resume::Exit => {
                    self.state = RunState::Finished;
                    return false;
                }
                Resume::Restart => {
                    self.reset_point();
                    return true;
                }
            }
        }
    }

    fn reset_point(&mut self) {
        self.point = C::Point::default();
        self.deadline.disarm();
    }

    /// Back to the entry point, running
    pub fn restart(&mut self) {
        self.reset_point();
        self.state = RunState::Running;
    }

    /// Non-resumable until [`restart`](Self::restart)
    pub fn stop(&mut self) {
        if self.state == RunState::Running {
            self.state = RunState::Stopped;
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_finished(&self) -> bool {
        self.state == RunState::Finished
    }

    /// Saved resume point
    pub fn point(&self) -> C::Point {
        self.point
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }
}

impl<C: Coroutine> fmt::Debug for Protothread<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protothread")
            .field("name", &self.inner.name())
            .field("point", &self.point)
            .field("state", &self.state)
            .finish()
    }
}
