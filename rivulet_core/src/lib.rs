//! # RIVULET Core
//!
//! The runtime substrate of a control device: push-based dataflow plus a
//! cooperative task loop that multiplexes timers, "wake me" events and
//! interrupt-context producers onto a small number of tasks.
//!
//! - **Communication**: sources, sinks, flows, value cells and the
//!   cross-context [`AsyncFlow`] queue
//! - **Scheduling**: per-task [`Scheduler`] event loops and [`TimerSource`]s
//! - **Coroutines**: stackless state machines driven by a [`CoroutineRegistry`]
//! - **Core**: millisecond clocks shared by all of the above
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rivulet_core::{Observable, Scheduler, SchedulerConfig, ValueFlow};
//! use std::rc::Rc;
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::standard()).unwrap();
//! let led = Rc::new(ValueFlow::on_change("led", false));
//! led.on_each(|on| println!("led {}", if *on { "on" } else { "off" }));
//!
//! let blink = scheduler.timer(1, 500, true).unwrap();
//! let target = led.clone();
//! blink.on_each(move |_| target.set(!target.get()));
//!
//! let samples = scheduler.async_flow::<u32>("samples", 8).unwrap();
//! let producer = samples.sender();
//! std::thread::spawn(move || producer.push(42));
//!
//! scheduler.run();
//! ```

pub mod communication;
pub mod core;
pub mod coroutine;
pub mod error;
pub mod scheduling;

// Re-export commonly used types for easy access
pub use communication::{
    bind, compose, AsyncFlow, AsyncSender, EmitPolicy, Flow, IsrSender, Observable, Requestable,
    Sink, Source, ValueFlow,
};
pub use core::{Clock, ClockRef, ManualClock, SystemClock};
pub use coroutine::{Context, Coroutine, CoroutineRegistry, Protothread, RegistryTicker, Resume};
pub use error::{RivuletError, RivuletResult};
pub use scheduling::{
    spawn_task, Poller, RuntimeConfig, Scheduler, SchedulerConfig, TaskHandle, TimerMsg,
    TimerSource,
};
