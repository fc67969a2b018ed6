//! What a coroutine step can see and touch

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::core::ClockRef;
use crate::scheduling::Deadline;

/// Group-wide signal bits shared by every coroutine of one registry
///
/// Cloning shares the same bits. Safe to set from other threads and from
/// interrupt context.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    bits: Arc<AtomicU32>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `mask`; returns whether any bit was newly set
    pub fn set_bits(&self, mask: u32) -> bool {
        self.bits.fetch_or(mask, Ordering::AcqRel) & mask != mask
    }

    /// Clear `mask`; returns whether any bit was previously set
    pub fn clear_bits(&self, mask: u32) -> bool {
        self.bits.fetch_and(!mask, Ordering::AcqRel) & mask != 0
    }

    /// True when any bit of `mask` is set
    pub fn has_bits(&self, mask: u32) -> bool {
        self.bits.load(Ordering::Acquire) & mask != 0
    }

    /// True when every bit of `mask` is set
    pub fn has_all_bits(&self, mask: u32) -> bool {
        self.bits.load(Ordering::Acquire) & mask == mask
    }

    pub fn bits(&self) -> u32 {
        self.bits.load(Ordering::Acquire)
    }
}

/// Environment a registry (or a parent coroutine) provides to a step
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub(crate) clock: &'a ClockRef,
    pub(crate) signals: &'a Signals,
}

impl<'a> Env<'a> {
    pub fn new(clock: &'a ClockRef, signals: &'a Signals) -> Self {
        Self { clock, signals }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

/// Lifecycle change requested from inside a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Stop,
    Restart,
}

/// Per-step view handed to [`Coroutine::step`](super::Coroutine::step)
pub struct Context<'a> {
    env: Env<'a>,
    deadline: &'a mut Deadline,
    control: Option<Control>,
}

impl<'a> Context<'a> {
    pub(crate) fn new(env: Env<'a>, deadline: &'a mut Deadline) -> Self {
        Self {
            env,
            deadline,
            control: None,
        }
    }

    pub(crate) fn take_control(&mut self) -> Option<Control> {
        self.control.take()
    }

    pub fn now_ms(&self) -> u64 {
        self.env.now_ms()
    }

    pub fn clock(&self) -> &ClockRef {
        self.env.clock
    }

    pub fn signals(&self) -> &Signals {
        self.env.signals
    }

    /// Environment to pass on when driving a child coroutine
    pub fn env(&self) -> Env<'a> {
        self.env
    }

    /// Arm the default deadline `ms` from now; zero disarms it
    pub fn set_timeout(&mut self, ms: u64) {
        if ms == 0 {
            self.deadline.disarm();
        } else {
            *self.deadline = Deadline::after(self.now_ms(), ms);
        }
    }

    /// True once the default deadline has passed
    pub fn timeout(&self) -> bool {
        self.deadline.expired(self.now_ms())
    }

    pub fn deadline(&self) -> Deadline {
        *self.deadline
    }

    /// Make this coroutine non-resumable once the step returns
    pub fn stop(&mut self) {
        self.control = Some(Control::Stop);
    }

    /// Reset this coroutine to its entry point once the step returns
    pub fn restart(&mut self) {
        self.control = Some(Control::Restart);
    }
}
