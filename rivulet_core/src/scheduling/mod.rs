//! # RIVULET scheduling
//!
//! Cooperative task loops and the time sources they own:
//!
//! - **Scheduler**: one event loop per task, merging timer deadlines and a
//!   bounded queue of work tokens into a single dispatch point
//! - **TimerSource**: periodic or one-shot alarms polled by exactly one loop
//! - **Poller**: timer-driven round-robin over pull sources
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rivulet_core::communication::Observable;
//! use rivulet_core::scheduling::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::standard()).unwrap();
//! let blink = scheduler.timer(1, 500, true).unwrap();
//! blink.on_each(|tick| println!("tick {}", tick.id));
//! scheduler.run();
//! ```

pub mod config;
pub mod poller;
pub mod scheduler;
pub mod timer;

pub use config::{CoroutineConfig, RuntimeConfig, SchedulerConfig};
pub use poller::Poller;
pub use scheduler::{
    spawn_task, spawn_task_with_clock, Iteration, Scheduler, SchedulerHandle, SchedulerId,
    SchedulerStats, TaskHandle, TaskJoin, Wakeable, WorkToken,
};
pub use timer::{Deadline, TimerMsg, TimerSource};
