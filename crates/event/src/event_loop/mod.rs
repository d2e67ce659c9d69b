//! The event loop: owns one readiness engine, mints events, runs dispatch.

mod ops;
mod state;

#[cfg(test)]
mod tests;

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

pub(crate) use state::{FdCallback, LoopCore, SignalCallback, TimerCallback};
use state::{ExitRequest, Shared};

use crate::engine::{self, Backend};
use crate::error::Result;
use crate::events::{FdEvent, SignalEvent, TimerEvent};
use crate::time::{duration_ns, now_ns};

/// How [`Loop::run_loop`] terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
	/// Run a single dispatch cycle.
	Once,
	/// Dispatch until an exit is requested.
	Forever,
}

/// Single-threaded event dispatcher.
///
/// A `Loop` is a cheap handle; clones refer to the same loop. All callbacks
/// run on the one thread that entered [`run_loop`](Loop::run_loop). The only
/// operations reachable from other threads are those on [`LoopHandle`].
///
/// ```no_run
/// use tbox_event::{Backend, Loop, RunMode};
///
/// let ev_loop = Loop::new(Backend::Epoll)?;
/// ev_loop.exit_after(std::time::Duration::from_millis(100));
/// ev_loop.run_loop(RunMode::Forever)?;
/// # Ok::<(), tbox_event::Error>(())
/// ```
pub struct Loop {
	pub(crate) core: Rc<LoopCore>,
}

impl Clone for Loop {
	fn clone(&self) -> Self {
		Loop { core: self.core.clone() }
	}
}

impl Loop {
	/// Creates a loop on the given backend.
	pub fn new(backend: Backend) -> Result<Loop> {
		let poller = engine::new(backend)?;
		let waker = poller.waker();
		let shared = Arc::new(Shared {
			queue: Mutex::new(VecDeque::new()),
			exit: Mutex::new(ExitRequest::None),
			waker,
		});
		Ok(Loop {
			core: Rc::new(LoopCore::new(backend, poller, shared)),
		})
	}

	/// Creates a loop from a runtime backend tag (`"epoll"`, `"mio"`,
	/// `"polling"`).
	pub fn from_tag(tag: &str) -> Result<Loop> {
		Loop::new(tag.parse()?)
	}

	/// The backend this loop runs on.
	pub fn backend(&self) -> Backend {
		self.core.backend
	}

	/// Mints an fd readiness event bound to this loop.
	pub fn new_fd_event(&self) -> FdEvent {
		FdEvent::new(self.core.clone())
	}

	/// Mints a timer event bound to this loop.
	pub fn new_timer_event(&self) -> TimerEvent {
		TimerEvent::new(self.core.clone())
	}

	/// Mints a signal subscription bound to this loop.
	pub fn new_signal_event(&self) -> SignalEvent {
		SignalEvent::new(self.core.clone())
	}

	/// Enters dispatch on the calling thread.
	///
	/// Returns when an exit is requested (or after one cycle for
	/// [`RunMode::Once`]). Any pending exit request is consumed on return.
	pub fn run_loop(&self, mode: RunMode) -> Result<()> {
		let core = &self.core;
		assert!(!core.running.get(), "run_loop re-entered from a callback");
		core.running.set(true);
		core.loop_thread.set(Some(thread::current().id()));
		tracing::debug!(backend = ?core.backend, ?mode, "loop entered");
		let mut result = Ok(());
		loop {
			if core.should_exit() {
				break;
			}
			if let Err(err) = core.run_once() {
				result = Err(err);
				break;
			}
			if mode == RunMode::Once {
				break;
			}
		}
		*core.shared.exit.lock() = ExitRequest::None;
		core.loop_thread.set(None);
		core.running.set(false);
		tracing::debug!("loop exited");
		result
	}

	/// Requests exit at the next cycle boundary. Idempotent.
	pub fn exit_loop(&self) {
		*self.core.shared.exit.lock() = ExitRequest::Now;
		self.core.shared.waker.wake();
	}

	/// Requests exit once `delay` has elapsed. The earliest requested
	/// deadline wins; a later, longer delay is ignored.
	pub fn exit_after(&self, delay: Duration) {
		let deadline = now_ns() + duration_ns(delay);
		{
			let mut exit = self.core.shared.exit.lock();
			*exit = exit.tighten(deadline);
		}
		self.core.shared.waker.wake();
	}

	/// Enqueues `f` on the cross-thread deferred queue; it runs on the loop
	/// thread during the current or next cycle, FIFO.
	pub fn run_in_loop(&self, f: impl FnOnce() + Send + 'static) {
		self.core.shared.queue.lock().push_back(Box::new(f));
		self.core.shared.waker.wake();
	}

	/// Enqueues `f` to run on the loop thread after the currently executing
	/// callback returns and before the next wait.
	pub fn run_next(&self, f: impl FnOnce() + 'static) {
		self.core.run_next.borrow_mut().push_back(Box::new(f));
	}

	/// Whether the caller is the thread currently inside `run_loop`.
	pub fn is_in_loop_thread(&self) -> bool {
		self.core.loop_thread.get() == Some(thread::current().id())
	}

	/// Whether the loop is currently inside `run_loop`.
	pub fn is_running(&self) -> bool {
		self.core.running.get()
	}

	/// A `Send + Sync` handle for foreign threads.
	pub fn handle(&self) -> LoopHandle {
		LoopHandle {
			shared: self.core.shared.clone(),
		}
	}
}

/// The cross-thread surface of a [`Loop`].
///
/// Deferred callables posted here observe the loop thread's memory view
/// through the wake happens-before edge.
#[derive(Clone)]
pub struct LoopHandle {
	shared: Arc<Shared>,
}

impl LoopHandle {
	/// See [`Loop::run_in_loop`].
	pub fn run_in_loop(&self, f: impl FnOnce() + Send + 'static) {
		self.shared.queue.lock().push_back(Box::new(f));
		self.shared.waker.wake();
	}

	/// See [`Loop::exit_loop`].
	pub fn exit_loop(&self) {
		*self.shared.exit.lock() = ExitRequest::Now;
		self.shared.waker.wake();
	}

	/// See [`Loop::exit_after`].
	pub fn exit_after(&self, delay: Duration) {
		let deadline = now_ns() + duration_ns(delay);
		{
			let mut exit = self.shared.exit.lock();
			*exit = exit.tighten(deadline);
		}
		self.shared.waker.wake();
	}
}
