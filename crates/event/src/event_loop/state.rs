//! Loop-internal state: watcher tables, the timer heap, deferred queues.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::os::fd::{OwnedFd, RawFd};
use std::rc::Rc;
use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use slab::Slab;

use crate::engine::{Backend, Poller, Wake};
use crate::mask::{EventMask, Mode};

/// Callable posted from any thread via `run_in_loop`.
pub(crate) type CrossCallable = Box<dyn FnOnce() + Send>;
/// Callable posted from the loop thread via `run_next`.
pub(crate) type LocalCallable = Box<dyn FnOnce()>;

/// Callback slots are shared between the event handle and its watcher entry.
/// The slot is emptied while the callback runs, so a callback may replace
/// itself (or drop its own event) without aliasing.
pub(crate) type FdCallback = Rc<RefCell<Option<Box<dyn FnMut(EventMask)>>>>;
pub(crate) type TimerCallback = Rc<RefCell<Option<Box<dyn FnMut()>>>>;
pub(crate) type SignalCallback = Rc<RefCell<Option<Box<dyn FnMut(i32)>>>>;

/// Exit request, earliest deadline wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitRequest {
	None,
	Now,
	At(u64),
}

impl ExitRequest {
	pub(crate) fn tighten(self, deadline_ns: u64) -> ExitRequest {
		match self {
			ExitRequest::Now => ExitRequest::Now,
			ExitRequest::None => ExitRequest::At(deadline_ns),
			ExitRequest::At(d) => ExitRequest::At(d.min(deadline_ns)),
		}
	}
}

/// The only state reachable from foreign threads: the deferred queue, the
/// exit request, and the backend's wake primitive.
pub(crate) struct Shared {
	pub(crate) queue: Mutex<VecDeque<CrossCallable>>,
	pub(crate) exit: Mutex<ExitRequest>,
	pub(crate) waker: Arc<dyn Wake>,
}

pub(crate) struct FdWatcher {
	pub(crate) record: usize,
	pub(crate) mask: EventMask,
	pub(crate) mode: Mode,
	pub(crate) enabled: bool,
	pub(crate) generation: u64,
	pub(crate) callback: FdCallback,
}

/// Per-fd aggregation: several watchers may subscribe to one fd, but the
/// poller sees a single registration carrying the union of enabled masks.
pub(crate) struct FdRecord {
	pub(crate) fd: RawFd,
	/// Mask currently registered with the poller; empty means unregistered.
	pub(crate) registered: EventMask,
	pub(crate) watchers: Vec<usize>,
}

pub(crate) struct TimerWatcher {
	pub(crate) interval_ns: u64,
	pub(crate) mode: Mode,
	pub(crate) enabled: bool,
	pub(crate) generation: u64,
	pub(crate) callback: TimerCallback,
}

pub(crate) struct SignalWatcher {
	pub(crate) signo: i32,
	pub(crate) mode: Mode,
	pub(crate) enabled: bool,
	pub(crate) generation: u64,
	pub(crate) callback: SignalCallback,
}

/// Min-heap entry: deadline first, then FIFO sequence for equal deadlines.
/// Stale entries (generation mismatch) are discarded lazily.
pub(crate) struct TimerDeadline {
	pub(crate) deadline_ns: u64,
	pub(crate) seq: u64,
	pub(crate) key: usize,
	pub(crate) generation: u64,
}

impl Ord for TimerDeadline {
	fn cmp(&self, other: &Self) -> Ordering {
		(self.deadline_ns, self.seq).cmp(&(other.deadline_ns, other.seq)).reverse()
	}
}

impl PartialOrd for TimerDeadline {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for TimerDeadline {
	fn eq(&self, other: &Self) -> bool {
		(self.deadline_ns, self.seq) == (other.deadline_ns, other.seq)
	}
}

impl Eq for TimerDeadline {}

pub(crate) struct LoopCore {
	pub(crate) backend: Backend,
	pub(crate) poller: RefCell<Box<dyn Poller>>,
	pub(crate) shared: Arc<Shared>,

	pub(crate) fd_watchers: RefCell<Slab<FdWatcher>>,
	pub(crate) fd_records: RefCell<Slab<FdRecord>>,
	pub(crate) fd_index: RefCell<HashMap<RawFd, usize>>,

	pub(crate) timers: RefCell<Slab<TimerWatcher>>,
	pub(crate) timer_heap: RefCell<BinaryHeap<TimerDeadline>>,
	pub(crate) timer_seq: Cell<u64>,

	pub(crate) signals: RefCell<Slab<SignalWatcher>>,
	/// Router slot index, allocated lazily on the first enabled signal event.
	pub(crate) signal_slot: Cell<Option<usize>>,
	/// (read, write) halves of the self-pipe the router handler writes into.
	pub(crate) signal_pipe: RefCell<Option<(OwnedFd, OwnedFd)>>,
	/// Internal fd watcher draining the self-pipe.
	pub(crate) signal_pipe_watcher: Cell<Option<usize>>,
	/// Enabled-subscription count per signo for this loop.
	pub(crate) signal_refs: RefCell<HashMap<i32, usize>>,

	pub(crate) run_next: RefCell<VecDeque<LocalCallable>>,

	/// Generations are minted from one counter so a recycled slab key can
	/// never satisfy the generation check of a stale heap or dispatch entry.
	pub(crate) next_generation: Cell<u64>,
	pub(crate) loop_thread: Cell<Option<ThreadId>>,
	pub(crate) running: Cell<bool>,
}

impl LoopCore {
	pub(crate) fn new(backend: Backend, poller: Box<dyn Poller>, shared: Arc<Shared>) -> LoopCore {
		LoopCore {
			backend,
			poller: RefCell::new(poller),
			shared,
			fd_watchers: RefCell::new(Slab::new()),
			fd_records: RefCell::new(Slab::new()),
			fd_index: RefCell::new(HashMap::new()),
			timers: RefCell::new(Slab::new()),
			timer_heap: RefCell::new(BinaryHeap::new()),
			timer_seq: Cell::new(0),
			signals: RefCell::new(Slab::new()),
			signal_slot: Cell::new(None),
			signal_pipe: RefCell::new(None),
			signal_pipe_watcher: Cell::new(None),
			signal_refs: RefCell::new(HashMap::new()),
			run_next: RefCell::new(VecDeque::new()),
			next_generation: Cell::new(0),
			loop_thread: Cell::new(None),
			running: Cell::new(false),
		}
	}

	pub(crate) fn fresh_generation(&self) -> u64 {
		let g = self.next_generation.get();
		self.next_generation.set(g + 1);
		g
	}

	pub(crate) fn next_timer_seq(&self) -> u64 {
		let s = self.timer_seq.get();
		self.timer_seq.set(s + 1);
		s
	}
}

impl Drop for LoopCore {
	fn drop(&mut self) {
		if let Some(slot) = self.signal_slot.get() {
			for (&signo, &count) in self.signal_refs.borrow().iter() {
				if count > 0 {
					crate::signal_router::unsubscribe(slot, signo);
				}
			}
			// Detach the handler-visible wake fd before the pipe closes.
			crate::signal_router::release_slot(slot);
		}
		if let Some(watcher) = self.signal_pipe_watcher.take() {
			self.remove_fd_watcher(watcher);
		}
		self.signal_pipe.borrow_mut().take();
	}
}
