//! # RIVULET dataflow
//!
//! Push-based, synchronous publish/subscribe primitives:
//!
//! - **Source / Sink / Flow**: fan-out dispatch in registration order, on the
//!   caller's context
//! - **ValueFlow**: named cells that re-emit on request
//! - **Operators**: map, filter, throttle, dead-band and timeout stages
//! - **AsyncFlow**: the bounded queue that carries values across tasks and
//!   out of interrupt handlers
//!
//! ## Usage
//!
//! ```
//! use std::rc::Rc;
//! use rivulet_core::communication::{bind, Observable, ValueFlow};
//!
//! let setpoint = Rc::new(ValueFlow::on_change("setpoint", 0));
//! let remote = Rc::new(ValueFlow::new("remote/setpoint", 0));
//! bind(&setpoint, &remote);
//!
//! setpoint.on_each(|v| println!("setpoint now {}", v));
//! remote.set(1200);
//! assert_eq!(setpoint.get(), 1200);
//! ```

pub mod async_flow;
pub mod compose;
pub mod operators;
pub mod source;
pub mod traits;
pub mod value_flow;

pub use async_flow::{AsyncFlow, AsyncFlowStats, AsyncSender, IsrSender, DEFAULT_LOCK_TIMEOUT};
pub use compose::{compose, Composite};
pub use operators::{
    BufferedSink, ChangeFlow, Debounce, Filter, HandlerSink, LambdaSource, LastValueSink, Map,
    Throttle, TimeoutFlow,
};
pub use source::{Source, Subscription};
pub use traits::{Flow, Observable, Requestable, Sink};
pub use value_flow::{bind, EmitPolicy, ValueFlow};
