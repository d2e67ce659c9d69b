//! Interval timer subscription.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::event_loop::{LoopCore, TimerCallback};
use crate::mask::Mode;
use crate::time::duration_ns;

/// A one-shot or periodic timer on the loop's monotonic clock.
///
/// Periodic timers re-arm at `deadline + interval` rather than at dispatch
/// time, so handler latency does not accumulate as drift.
pub struct TimerEvent {
	core: Rc<LoopCore>,
	key: Cell<Option<usize>>,
	callback: TimerCallback,
}

impl TimerEvent {
	pub(crate) fn new(core: Rc<LoopCore>) -> TimerEvent {
		TimerEvent {
			core,
			key: Cell::new(None),
			callback: Rc::new(RefCell::new(None)),
		}
	}

	pub fn set_callback(&self, f: impl FnMut() + 'static) {
		*self.callback.borrow_mut() = Some(Box::new(f));
	}

	/// Sets the interval and delivery mode. Legal exactly once; a periodic
	/// timer requires a non-zero interval.
	pub fn initialize(&self, interval: Duration, mode: Mode) -> bool {
		assert!(mode == Mode::Oneshot || !interval.is_zero(), "periodic timer with zero interval");
		if self.key.get().is_some() {
			return false;
		}
		let key = self.core.add_timer_watcher(self.callback.clone());
		self.core.set_timer(key, duration_ns(interval), mode);
		self.key.set(Some(key));
		true
	}

	/// Arms the timer at `now + interval`. No-op when already enabled.
	pub fn enable(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.enable_timer(key))
	}

	/// Disarms the timer; a pending expiry will not be delivered.
	pub fn disable(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.disable_timer(key))
	}

	pub fn is_initialized(&self) -> bool {
		self.key.get().is_some()
	}

	pub fn is_enabled(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.timer_enabled(key))
	}
}

impl Drop for TimerEvent {
	fn drop(&mut self) {
		if let Some(key) = self.key.get() {
			self.core.remove_timer_watcher(key);
		}
	}
}
