//! # Stackless coroutines
//!
//! A coroutine is an explicit state machine: its resume point is a small
//! `Copy` enum, and [`Coroutine::step`] is called with the saved point every
//! time it is resumed. Nothing lives on a stack between resumptions.
//!
//! - [`Resume::Goto`] continues at another point within the same call
//! - [`Resume::Yield`] saves a point and hands control back
//! - [`Resume::Exit`] ends the coroutine, [`Resume::Restart`] rewinds it
//!
//! A conditional wait is a point that yields to itself until its predicate
//! holds:
//!
//! ```
//! use rivulet_core::coroutine::{Context, Coroutine, Resume};
//!
//! #[derive(Debug, Clone, Copy, Default, PartialEq)]
//! enum Step {
//!     #[default]
//!     WaitLink,
//!     Publish,
//! }
//!
//! struct Reporter;
//!
//! impl Coroutine for Reporter {
//!     type Point = Step;
//!
//!     fn name(&self) -> &str {
//!         "reporter"
//!     }
//!
//!     fn step(&mut self, at: Step, ctx: &mut Context<'_>) -> Resume<Step> {
//!         match at {
//!             Step::WaitLink => Resume::wait_until(ctx.signals().has_bits(0x1), Step::WaitLink, Step::Publish),
//!             Step::Publish => Resume::Exit,
//!         }
//!     }
//! }
//! ```
//!
//! Coroutines are driven round-robin by a [`CoroutineRegistry`], typically
//! from a scheduler timer through a [`RegistryTicker`].

pub mod context;
pub mod protothread;
pub mod registry;

use std::fmt::Debug;

pub use context::{Context, Env, Signals};
pub use protothread::{Protothread, RunState};
pub use registry::{CoroutineId, CoroutineRegistry, RegistryTicker};

/// How a step wants to continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume<P> {
    /// Continue at `P` within the same invocation
    Goto(P),
    /// Save `P` and return; the next invocation starts there
    Yield(P),
    /// Finish; the coroutine is never resumed again unless restarted
    Exit,
    /// Rewind to the entry point and return
    Restart,
}

impl<P> Resume<P> {
    /// Stay at `here` until `condition` holds, then fall through to `next`
    pub fn wait_until(condition: bool, here: P, next: P) -> Self {
        if condition {
            Resume::Goto(next)
        } else {
            Resume::Yield(here)
        }
    }

    /// Stay at `here` while `condition` holds, then fall through to `next`
    pub fn wait_while(condition: bool, here: P, next: P) -> Self {
        Self::wait_until(!condition, here, next)
    }

    /// Unconditional yield, resuming at `next`
    pub fn yield_to(next: P) -> Self {
        Resume::Yield(next)
    }
}

/// A body that can be re-entered from a saved resume point
pub trait Coroutine: 'static {
    /// Resume points; `Default` is the entry point
    type Point: Copy + Default + PartialEq + Debug;

    fn name(&self) -> &str;

    /// Called once by [`CoroutineRegistry::setup_all`]
    fn setup(&mut self, _ctx: &mut Context<'_>) {}

    /// Run from `at` until the next yield, exit or restart
    fn step(&mut self, at: Self::Point, ctx: &mut Context<'_>) -> Resume<Self::Point>;
}
