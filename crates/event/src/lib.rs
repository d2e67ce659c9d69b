//! Event loop core for single-threaded, event-driven daemons.
//!
//! One [`Loop`] owns one readiness engine (selected via [`Backend`]) and
//! dispatches fd readiness, timers, signals, and deferred callables on the
//! single thread that entered [`Loop::run_loop`]. Higher layers (the
//! token-based timer facility, the action flow engine) build on the events
//! minted here.

mod engine;
mod error;
mod event_loop;
mod events;
mod mask;
mod signal_router;
pub mod time;

pub use engine::Backend;
pub use error::{Error, Result};
pub use event_loop::{Loop, LoopHandle, RunMode};
pub use events::{FdEvent, SignalEvent, TimerEvent};
pub use mask::{EventMask, Mode};
