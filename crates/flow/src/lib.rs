//! Hierarchical action flows on the event loop.
//!
//! An [`Action`] is a pausable, restartable state machine; combinators
//! (sequence, parallel, repeat, if-else, loop) compose child actions into
//! workflows. All lifecycle callbacks run on the loop thread, and finish
//! callbacks are always deferred through the loop so the state machine is
//! never observed mid-transition.

mod action;
pub mod actions;

pub use action::{Action, Behavior, Finisher, Json, Outcome, State};
pub use actions::{LoopMode, ParallelPolicy, RepeatMode};
