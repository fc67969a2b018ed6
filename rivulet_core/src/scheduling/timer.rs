//! Periodic and one-shot timers
//!
//! A [`TimerSource`] becomes due at an absolute deadline on its clock and
//! emits a [`TimerMsg`] when polled at or after that deadline. Repeating
//! timers re-arm to `deadline + interval`, never to `now + interval`, so late
//! polling does not accumulate drift.

use std::cell::Cell;
use std::fmt;

use super::scheduler::SchedulerId;
use crate::communication::{Observable, Requestable, Source};
use crate::core::ClockRef;
use crate::error::{RivuletError, RivuletResult};

/// Event emitted by a timer when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerMsg {
    pub id: u32,
}

/// Optional absolute point in time, in clock milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline {
    at: Option<u64>,
}

impl Deadline {
    /// A deadline that never expires
    pub const fn never() -> Self {
        Self { at: None }
    }

    pub const fn at(at_ms: u64) -> Self {
        Self { at: Some(at_ms) }
    }

    pub fn after(now_ms: u64, delay_ms: u64) -> Self {
        Self::at(now_ms.saturating_add(delay_ms))
    }

    pub fn arm(&mut self, at_ms: u64) {
        self.at = Some(at_ms);
    }

    pub fn disarm(&mut self) {
        self.at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.at.is_some()
    }

    pub fn instant(&self) -> Option<u64> {
        self.at
    }

    /// Armed and reached
    pub fn expired(&self, now_ms: u64) -> bool {
        matches!(self.at, Some(at) if now_ms >= at)
    }

    /// Milliseconds left, zero once expired, `None` when disarmed
    pub fn remaining(&self, now_ms: u64) -> Option<u64> {
        self.at.map(|at| at.saturating_sub(now_ms))
    }
}

/// Alarm identified by a small integer id
///
/// Created running, with its first deadline one interval after creation.
/// A one-shot timer fires once and then stays inert until [`start`](Self::start)
/// re-arms it, even though [`is_running`](Self::is_running) keeps reporting true.
pub struct TimerSource {
    id: u32,
    clock: ClockRef,
    interval_ms: Cell<u64>,
    repeat: bool,
    running: Cell<bool>,
    fired: Cell<bool>,
    deadline: Cell<u64>,
    owner: Cell<Option<SchedulerId>>,
    source: Source<TimerMsg>,
}

impl TimerSource {
    /// An interval of zero is treated as one millisecond.
    pub fn new(id: u32, interval_ms: u64, repeat: bool, clock: ClockRef) -> Self {
        let interval_ms = interval_ms.max(1);
        let deadline = clock.now_ms().saturating_add(interval_ms);
        Self {
            id,
            clock,
            interval_ms: Cell::new(interval_ms),
            repeat,
            running: Cell::new(true),
            fired: Cell::new(false),
            deadline: Cell::new(deadline),
            owner: Cell::new(None),
            source: Source::new(),
        }
    }

    pub fn repeating(id: u32, interval_ms: u64, clock: ClockRef) -> Self {
        Self::new(id, interval_ms, true, clock)
    }

    pub fn one_shot(id: u32, delay_ms: u64, clock: ClockRef) -> Self {
        Self::new(id, delay_ms, false, clock)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn interval(&self) -> u64 {
        self.interval_ms.get()
    }

    /// Change the interval; the current deadline is kept and the new value
    /// applies from the next re-arm
    pub fn set_interval(&self, interval_ms: u64) {
        self.interval_ms.set(interval_ms.max(1));
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Running and still able to fire
    pub fn is_armed(&self) -> bool {
        self.running.get() && !self.fired.get()
    }

    /// Deadline of an armed timer
    pub fn next_deadline(&self) -> Option<u64> {
        self.is_armed().then(|| self.deadline.get())
    }

    pub fn is_due(&self, now_ms: u64) -> bool {
        self.is_armed() && now_ms >= self.deadline.get()
    }

    /// Re-arm one interval from now
    pub fn start(&self) {
        let now = self.clock.now_ms();
        self.deadline
            .set(now.saturating_add(self.interval_ms.get()));
        self.fired.set(false);
        self.running.set(true);
    }

    pub fn stop(&self) {
        self.running.set(false);
    }

    /// Fire if due. Returns whether the timer fired.
    ///
    /// At most one emission per call: a timer that is several intervals late
    /// catches up over successive polls.
    pub fn poll(&self) -> bool {
        if !self.is_due(self.clock.now_ms()) {
            return false;
        }
        if self.repeat {
            self.deadline
                .set(self.deadline.get().saturating_add(self.interval_ms.get()));
        } else {
            self.fired.set(true);
        }
        self.source.emit(&TimerMsg { id: self.id });
        true
    }

    pub fn owner(&self) -> Option<SchedulerId> {
        self.owner.get()
    }

    /// Record `scheduler` as the only loop allowed to poll this timer
    ///
    /// Returns `Ok(false)` when it already owns the timer.
    pub(crate) fn claim(&self, scheduler: SchedulerId) -> RivuletResult<bool> {
        match self.owner.get() {
            None => {
                self.owner.set(Some(scheduler));
                Ok(true)
            }
            Some(owner) if owner == scheduler => Ok(false),
            Some(owner) => Err(RivuletError::TimerAlreadyOwned {
                timer: self.id,
                owner: owner.as_u64(),
            }),
        }
    }
}

impl Requestable for TimerSource {
    fn request(&self) {
        self.poll();
    }
}

impl Observable<TimerMsg> for TimerSource {
    fn source(&self) -> &Source<TimerMsg> {
        &self.source
    }
}

impl fmt::Debug for TimerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerSource")
            .field("id", &self.id)
            .field("interval_ms", &self.interval_ms.get())
            .field("repeat", &self.repeat)
            .field("running", &self.running.get())
            .field("fired", &self.fired.get())
            .field("deadline", &self.deadline.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::LastValueSink;
    use crate::core::ManualClock;
    use std::rc::Rc;

    // ========================================================================
    // Deadline
    // ========================================================================

    #[test]
    fn test_deadline_expiry() {
        let mut deadline = Deadline::never();
        assert!(!deadline.expired(u64::MAX));

        deadline.arm(100);
        assert!(!deadline.expired(99));
        assert!(deadline.expired(100));
        assert_eq!(deadline.remaining(40), Some(60));
        assert_eq!(deadline.remaining(140), Some(0));

        deadline.disarm();
        assert_eq!(deadline.remaining(0), None);
    }

    // ========================================================================
    // Repeating timers
    // ========================================================================

    #[test]
    fn test_late_poll_fires_once_without_drift() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::repeating(1, 100, clock.clone());
        let last = Rc::new(LastValueSink::new());
        timer.subscribe(&last);

        clock.set(250);
        assert!(timer.poll());
        assert_eq!(last.received(), 1);
        assert_eq!(last.get(), Some(TimerMsg { id: 1 }));
        assert_eq!(timer.next_deadline(), Some(200));
    }

    #[test]
    fn test_deadlines_follow_interval_grid() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::repeating(2, 100, clock.clone());
        let mut fired_at = Vec::new();

        for now in [130, 170, 260, 390, 401] {
            clock.set(now);
            let deadline = timer.next_deadline();
            if timer.poll() {
                fired_at.push(deadline);
            }
        }

        assert_eq!(fired_at, vec![Some(100), Some(200), Some(300), Some(400)]);
        assert_eq!(timer.next_deadline(), Some(500));
    }

    #[test]
    fn test_set_interval_not_retroactive() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::repeating(3, 100, clock.clone());
        timer.set_interval(40);
        assert_eq!(timer.next_deadline(), Some(100));

        clock.set(100);
        assert!(timer.poll());
        assert_eq!(timer.next_deadline(), Some(140));
    }

    // ========================================================================
    // Start / stop and one-shots
    // ========================================================================

    #[test]
    fn test_stopped_timer_never_due() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::repeating(4, 10, clock.clone());
        timer.stop();
        clock.set(1_000);
        assert!(!timer.is_due(1_000));
        assert!(!timer.poll());
        assert_eq!(timer.next_deadline(), None);

        timer.start();
        assert_eq!(timer.next_deadline(), Some(1_010));
    }

    #[test]
    fn test_one_shot_stays_inert() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::one_shot(5, 50, clock.clone());

        clock.set(60);
        assert!(timer.poll());
        clock.set(500);
        assert!(!timer.poll());
        assert!(timer.is_running());
        assert!(!timer.is_armed());

        timer.start();
        clock.set(550);
        assert!(timer.poll());
    }

    #[test]
    fn test_claim_rejects_second_owner() {
        let clock = ManualClock::shared(0);
        let timer = TimerSource::repeating(6, 10, clock);
        let a = SchedulerId::next();
        let b = SchedulerId::next();

        assert!(timer.claim(a).unwrap());
        assert!(!timer.claim(a).unwrap());
        let err = timer.claim(b).unwrap_err();
        assert!(err.is_ownership_conflict());
    }
}
