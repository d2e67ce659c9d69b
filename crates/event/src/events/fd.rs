//! Fd readiness subscription.

use std::cell::{Cell, RefCell};
use std::os::fd::AsRawFd;
use std::rc::Rc;

use crate::error::Result;
use crate::event_loop::{FdCallback, LoopCore};
use crate::mask::{EventMask, Mode};

/// A subscription to readiness of one borrowed fd.
///
/// The fd is never owned: the caller keeps it open for as long as the event
/// is initialized. Several `FdEvent`s may watch the same fd; each receives
/// the fired mask intersected with its own subscription.
pub struct FdEvent {
	core: Rc<LoopCore>,
	key: Cell<Option<usize>>,
	callback: FdCallback,
}

impl FdEvent {
	pub(crate) fn new(core: Rc<LoopCore>) -> FdEvent {
		FdEvent {
			core,
			key: Cell::new(None),
			callback: Rc::new(RefCell::new(None)),
		}
	}

	/// Installs the callback invoked with the fired mask. May be called at
	/// any time, including from the callback itself.
	pub fn set_callback(&self, f: impl FnMut(EventMask) + 'static) {
		*self.callback.borrow_mut() = Some(Box::new(f));
	}

	/// Binds the event to `fd` with a subscription mask and delivery mode.
	///
	/// Legal once; re-initialization is allowed only with the same fd (the
	/// event comes back disabled with the new mask and mode). Returns
	/// whether the call took effect.
	pub fn initialize<F: AsRawFd>(&self, fd: &F, mask: EventMask, mode: Mode) -> bool {
		let raw = fd.as_raw_fd();
		match self.key.get() {
			Some(key) => {
				if self.core.fd_watcher_fd(key) != Some(raw) {
					return false;
				}
				self.core.reinit_fd_watcher(key, mask, mode);
				true
			}
			None => {
				let key = self.core.add_fd_watcher(raw, mask, mode, self.callback.clone());
				self.key.set(Some(key));
				true
			}
		}
	}

	/// Starts delivery. No-op (returning `Ok(true)`) when already enabled;
	/// `Ok(false)` when uninitialized; `Err` when the backend refuses the
	/// fd.
	pub fn enable(&self) -> Result<bool> {
		match self.key.get() {
			Some(key) => self.core.enable_fd(key),
			None => Ok(false),
		}
	}

	/// Stops delivery. After this returns, the callback will not run for
	/// readiness that predates the call.
	pub fn disable(&self) -> bool {
		match self.key.get() {
			Some(key) => self.core.disable_fd(key),
			None => false,
		}
	}

	pub fn is_initialized(&self) -> bool {
		self.key.get().is_some()
	}

	pub fn is_enabled(&self) -> bool {
		self.key.get().is_some_and(|key| self.core.fd_enabled(key))
	}
}

impl Drop for FdEvent {
	fn drop(&mut self) {
		if let Some(key) = self.key.get() {
			self.core.remove_fd_watcher(key);
		}
	}
}
