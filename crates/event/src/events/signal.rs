//! Signal subscription.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::Result;
use crate::event_loop::{LoopCore, SignalCallback};
use crate::mask::Mode;

/// A subscription to one POSIX signal, routed into the loop.
///
/// Enabling the first subscription installs a process-wide disposition that
/// forwards into every subscribed loop; the previous disposition is restored
/// when the last subscription for that signal is dropped. Arrivals between
/// two dispatch cycles coalesce into a single delivery.
pub struct SignalEvent {
	core: Rc<LoopCore>,
	key: Cell<Option<usize>>,
	callback: SignalCallback,
}

impl SignalEvent {
	pub(crate) fn new(core: Rc<LoopCore>) -> SignalEvent {
		SignalEvent {
			core,
			key: Cell::new(None),
			callback: Rc::new(RefCell::new(None)),
		}
	}

	/// Installs the callback; it receives the signal number.
	pub fn set_callback(&self, f: impl FnMut(i32) + 'static) {
		*self.callback.borrow_mut() = Some(Box::new(f));
	}

	/// Binds the subscription to `signo`. Legal exactly once.
	pub fn initialize(&self, signo: i32, mode: Mode) -> bool {
		if self.key.get().is_some() || signo <= 0 {
			return false;
		}
		let key = self.core.add_signal_watcher(self.callback.clone());
		self.core.set_signal(key, signo, mode);
		self.key.set(Some(key));
		true
	}

	/// Starts delivery, installing the process-wide routing on first use.
	pub fn enable(&self) -> Result<bool> {
		match self.key.get() {
			Some(key) => self.core.enable_signal(key),
			None => Ok(false),
		}
	}

	pub fn disable(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.disable_signal(key))
	}

	pub fn is_initialized(&self) -> bool {
		self.key.get().is_some()
	}

	pub fn is_enabled(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.signal_enabled(key))
	}
}

impl Drop for SignalEvent {
	fn drop(&mut self) {
		if let Some(key) = self.key.get() {
			self.core.remove_signal_watcher(key);
		}
	}
}
