//! # Core types for RIVULET
//!
//! Time sources shared by timers, task loops and coroutine registries.

pub mod clock;

pub use clock::{Clock, ClockRef, ManualClock, SystemClock};
