//! Token-indexed timer set.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use tbox_event::{Loop, Mode, TimerEvent};

/// Identifies one scheduled timer.
///
/// Tokens are minted from a monotonically increasing counter and never
/// reused, so a stale token can never alias a live timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(u64);

type Callback = Box<dyn FnMut(Token)>;

struct Entry {
	/// Owns the underlying scheduling; dropping it disarms the timer.
	_event: TimerEvent,
}

struct State {
	entries: HashMap<Token, Entry>,
	next_token: u64,
}

/// A set of one-shot and periodic timers on one loop.
///
/// All callbacks run on the loop thread. `do_after` and `do_every` use the
/// monotonic clock; `do_at` converts a wall-clock point to a monotonic delay
/// at scheduling time.
#[derive(Clone)]
pub struct Timers {
	ev_loop: Loop,
	state: Rc<RefCell<State>>,
}

impl Timers {
	pub fn new(ev_loop: &Loop) -> Timers {
		Timers {
			ev_loop: ev_loop.clone(),
			state: Rc::new(RefCell::new(State {
				entries: HashMap::new(),
				next_token: 0,
			})),
		}
	}

	/// Fires `cb(token)` once, `delay` from now.
	pub fn do_after(&self, delay: Duration, cb: impl FnMut(Token) + 'static) -> Token {
		self.schedule(delay, Mode::Oneshot, Box::new(cb))
	}

	/// Fires `cb(token)` once when the wall clock reaches `at`. A point
	/// already in the past fires on the next dispatch cycle.
	pub fn do_at(&self, at: SystemTime, cb: impl FnMut(Token) + 'static) -> Token {
		let delay = at.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO);
		self.schedule(delay, Mode::Oneshot, Box::new(cb))
	}

	/// Fires `cb(token)` every `period` until cancelled, without
	/// accumulating drift.
	pub fn do_every(&self, period: Duration, cb: impl FnMut(Token) + 'static) -> Token {
		self.schedule(period, Mode::Persist, Box::new(cb))
	}

	/// Removes a timer; returns whether it was still live. Idempotent, and
	/// safe to call from the timer's own callback.
	pub fn cancel(&self, token: Token) -> bool {
		let cancelled = self.state.borrow_mut().entries.remove(&token).is_some();
		if cancelled {
			tracing::trace!(?token, "timer cancelled");
		}
		cancelled
	}

	/// Cancels every outstanding timer.
	pub fn cleanup(&self) {
		let drained: Vec<(Token, Entry)> = {
			let mut state = self.state.borrow_mut();
			state.entries.drain().collect()
		};
		tracing::debug!(count = drained.len(), "timers cleaned up");
	}

	/// Number of timers still scheduled.
	pub fn pending(&self) -> usize {
		self.state.borrow().entries.len()
	}

	fn schedule(&self, interval: Duration, mode: Mode, callback: Callback) -> Token {
		let token = {
			let mut state = self.state.borrow_mut();
			let token = Token(state.next_token);
			state.next_token += 1;
			token
		};
		let event = self.ev_loop.new_timer_event();
		let callback = Rc::new(RefCell::new(callback));
		let periodic = mode == Mode::Persist;
		{
			let state = Rc::downgrade(&self.state);
			event.set_callback(move || {
				let Some(state) = state.upgrade() else {
					return;
				};
				// The liveness check and the user call must not overlap a
				// borrow: the callback may cancel or schedule freely.
				if !state.borrow().entries.contains_key(&token) {
					return;
				}
				(callback.borrow_mut())(token);
				if !periodic {
					state.borrow_mut().entries.remove(&token);
				}
			});
		}
		event.initialize(interval, mode);
		event.enable();
		self.state.borrow_mut().entries.insert(token, Entry { _event: event });
		token
	}
}
