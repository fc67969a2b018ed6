//! # RIVULET - push-based dataflow for control devices
//!
//! RIVULET wires sensors, timers and interrupt-driven producers together as
//! graphs of sources, sinks and flows, and runs them on small cooperative
//! task loops.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rivulet::prelude::*;
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::standard()).unwrap();
//! let temperature = Rc::new(ValueFlow::on_change("temperature", 0i32));
//! temperature.on_each(|t| println!("temperature {}", t));
//!
//! let sensor = Rc::new(LambdaSource::new(|| 21));
//! sensor.subscribe(&temperature);
//! let poller = Poller::new(&mut scheduler, 1, 250).unwrap();
//! poller.add(sensor);
//!
//! scheduler.run();
//! ```
//!
//! ## Features
//!
//! - **Dataflow**: value cells, operators and bidirectional binding
//! - **Cross-context queues** fed from threads and interrupt handlers
//! - **Per-task event loops** with timers and bounded wake queues
//! - **Stackless coroutines** driven from a timer

// Re-export core components
pub use rivulet_core::{self, *};

/// The RIVULET prelude - everything a device program usually needs
///
/// Just add `use rivulet::prelude::*;` to get started.
pub mod prelude {
    // ============================================
    // Dataflow
    // ============================================
    pub use rivulet_core::communication::{
        bind, compose, BufferedSink, ChangeFlow, Debounce, EmitPolicy, Filter, Flow, HandlerSink,
        LambdaSource, LastValueSink, Map, Observable, Requestable, Sink, Source, Throttle,
        TimeoutFlow, ValueFlow,
    };

    // ============================================
    // Cross-context queues
    // ============================================
    pub use rivulet_core::communication::{AsyncFlow, AsyncSender, IsrSender};

    // ============================================
    // Scheduling
    // ============================================
    pub use rivulet_core::scheduling::{
        spawn_task, Poller, RuntimeConfig, Scheduler, SchedulerConfig, SchedulerHandle,
        TaskHandle, TaskJoin, TimerMsg, TimerSource,
    };

    // ============================================
    // Coroutines
    // ============================================
    pub use rivulet_core::coroutine::{
        Context, Coroutine, CoroutineRegistry, Protothread, RegistryTicker, Resume, Signals,
    };

    // ============================================
    // Clocks
    // ============================================
    pub use rivulet_core::core::{Clock, ClockRef, ManualClock, SystemClock};

    // ============================================
    // Error Types
    // ============================================
    pub use rivulet_core::error::{RivuletError, RivuletResult};
    pub type Result<T> = RivuletResult<T>;

    // ============================================
    // Common Std Types
    // ============================================
    pub use std::cell::RefCell;
    pub use std::rc::Rc;
    pub use std::time::Duration;

    // Re-export anyhow for error handling
    pub use anyhow::{anyhow, bail, ensure, Context as AnyContext, Result as AnyResult};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get RIVULET version
pub fn version() -> &'static str {
    VERSION
}
