//! Timer scheduling with opaque cancellation tokens.
//!
//! [`Timers`] wraps one [`Loop`](tbox_event::Loop) and hands out a
//! [`Token`] per scheduled callback. Tokens stay comparable after the timer
//! fired or was cancelled; a lookup then simply finds nothing.

mod timers;

pub use timers::{Timers, Token};
