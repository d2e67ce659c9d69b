//! Watcher bookkeeping and the dispatch cycle.

use std::cell::RefCell;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::rc::Rc;
use std::time::Duration;

use rustix::pipe::{PipeFlags, pipe_with};

use super::state::{
	ExitRequest, FdCallback, FdRecord, FdWatcher, LoopCore, SignalCallback, SignalWatcher, TimerCallback, TimerDeadline,
	TimerWatcher,
};
use crate::error::{Error, Result};
use crate::mask::{EventMask, Mode};
use crate::signal_router;
use crate::time::now_ns;

/// One fd delivery captured right after the backend wait. The generation
/// pins the watcher's identity at capture time: a disable between capture
/// and dispatch (from any earlier callback in the same cycle) suppresses
/// the delivery.
struct FdDispatch {
	watcher: usize,
	fired: EventMask,
	generation: u64,
}

fn invoke_fd(slot: &FdCallback, fired: EventMask) {
	let cb = slot.borrow_mut().take();
	if let Some(mut f) = cb {
		f(fired);
		let mut s = slot.borrow_mut();
		if s.is_none() {
			*s = Some(f);
		}
	}
}

fn invoke_timer(slot: &TimerCallback) {
	let cb = slot.borrow_mut().take();
	if let Some(mut f) = cb {
		f();
		let mut s = slot.borrow_mut();
		if s.is_none() {
			*s = Some(f);
		}
	}
}

fn invoke_signal(slot: &SignalCallback, signo: i32) {
	let cb = slot.borrow_mut().take();
	if let Some(mut f) = cb {
		f(signo);
		let mut s = slot.borrow_mut();
		if s.is_none() {
			*s = Some(f);
		}
	}
}

// fd watchers
impl LoopCore {
	pub(crate) fn add_fd_watcher(&self, fd: RawFd, mask: EventMask, mode: Mode, callback: FdCallback) -> usize {
		let record = {
			let mut index = self.fd_index.borrow_mut();
			match index.get(&fd) {
				Some(&record) => record,
				None => {
					let record = self.fd_records.borrow_mut().insert(FdRecord {
						fd,
						registered: EventMask::empty(),
						watchers: Vec::new(),
					});
					index.insert(fd, record);
					record
				}
			}
		};
		let generation = self.fresh_generation();
		let key = self.fd_watchers.borrow_mut().insert(FdWatcher {
			record,
			mask,
			mode,
			enabled: false,
			generation,
			callback,
		});
		self.fd_records.borrow_mut()[record].watchers.push(key);
		tracing::trace!(fd, key, "fd watcher added");
		key
	}

	pub(crate) fn fd_watcher_fd(&self, key: usize) -> Option<RawFd> {
		let watchers = self.fd_watchers.borrow();
		let records = self.fd_records.borrow();
		watchers.get(key).and_then(|w| records.get(w.record)).map(|r| r.fd)
	}

	/// Re-initialization keeps the fd and replaces mask and mode; the
	/// watcher comes back disabled.
	pub(crate) fn reinit_fd_watcher(&self, key: usize, mask: EventMask, mode: Mode) {
		self.disable_fd(key);
		let mut watchers = self.fd_watchers.borrow_mut();
		if let Some(w) = watchers.get_mut(key) {
			w.mask = mask;
			w.mode = mode;
		}
	}

	pub(crate) fn enable_fd(&self, key: usize) -> Result<bool> {
		let record = {
			let mut watchers = self.fd_watchers.borrow_mut();
			let Some(w) = watchers.get_mut(key) else {
				return Ok(false);
			};
			if w.enabled {
				return Ok(true);
			}
			w.enabled = true;
			w.record
		};
		if let Err(err) = self.sync_record(record) {
			self.fd_watchers.borrow_mut()[key].enabled = false;
			tracing::warn!(key, error = %err, "fd registration failed");
			return Err(Error::Io(err));
		}
		Ok(true)
	}

	pub(crate) fn disable_fd(&self, key: usize) -> bool {
		let record = {
			let mut watchers = self.fd_watchers.borrow_mut();
			let Some(w) = watchers.get_mut(key) else {
				return false;
			};
			if !w.enabled {
				return true;
			}
			w.enabled = false;
			w.generation = self.fresh_generation();
			w.record
		};
		if let Err(err) = self.sync_record(record) {
			tracing::warn!(key, error = %err, "fd deregistration failed");
		}
		true
	}

	pub(crate) fn fd_enabled(&self, key: usize) -> bool {
		self.fd_watchers.borrow().get(key).is_some_and(|w| w.enabled)
	}

	pub(crate) fn remove_fd_watcher(&self, key: usize) {
		let record = {
			let mut watchers = self.fd_watchers.borrow_mut();
			match watchers.try_remove(key) {
				Some(w) => w.record,
				None => return,
			}
		};
		if let Some(rec) = self.fd_records.borrow_mut().get_mut(record) {
			rec.watchers.retain(|&k| k != key);
		}
		if let Err(err) = self.sync_record(record) {
			tracing::warn!(key, error = %err, "fd deregistration failed");
		}
		let empty_fd = {
			let records = self.fd_records.borrow();
			records.get(record).filter(|r| r.watchers.is_empty()).map(|r| r.fd)
		};
		if let Some(fd) = empty_fd {
			self.fd_records.borrow_mut().remove(record);
			self.fd_index.borrow_mut().remove(&fd);
		}
	}

	/// Reconciles the poller registration with the union of enabled watcher
	/// masks for one fd record.
	fn sync_record(&self, record: usize) -> io::Result<()> {
		let (fd, want, have) = {
			let records = self.fd_records.borrow();
			let Some(rec) = records.get(record) else {
				return Ok(());
			};
			let watchers = self.fd_watchers.borrow();
			let mut want = EventMask::empty();
			for &k in &rec.watchers {
				if let Some(w) = watchers.get(k)
					&& w.enabled
				{
					want |= w.mask;
				}
			}
			(rec.fd, want, rec.registered)
		};
		if want == have {
			return Ok(());
		}
		{
			let mut poller = self.poller.borrow_mut();
			if have.is_empty() {
				poller.register(fd, record, want)?;
			} else if want.is_empty() {
				poller.deregister(fd)?;
			} else {
				poller.reregister(fd, record, want)?;
			}
		}
		self.fd_records.borrow_mut()[record].registered = want;
		Ok(())
	}
}

// timer watchers
impl LoopCore {
	pub(crate) fn add_timer_watcher(&self, callback: TimerCallback) -> usize {
		let generation = self.fresh_generation();
		self.timers.borrow_mut().insert(TimerWatcher {
			interval_ns: 0,
			mode: Mode::Oneshot,
			enabled: false,
			generation,
			callback,
		})
	}

	pub(crate) fn set_timer(&self, key: usize, interval_ns: u64, mode: Mode) {
		let mut timers = self.timers.borrow_mut();
		if let Some(w) = timers.get_mut(key) {
			w.interval_ns = interval_ns;
			w.mode = mode;
		}
	}

	pub(crate) fn enable_timer(&self, key: usize) -> bool {
		let mut timers = self.timers.borrow_mut();
		let Some(w) = timers.get_mut(key) else {
			return false;
		};
		if w.enabled {
			return true;
		}
		w.enabled = true;
		let entry = TimerDeadline {
			deadline_ns: now_ns() + w.interval_ns,
			seq: self.next_timer_seq(),
			key,
			generation: w.generation,
		};
		drop(timers);
		self.timer_heap.borrow_mut().push(entry);
		true
	}

	pub(crate) fn disable_timer(&self, key: usize) -> bool {
		let mut timers = self.timers.borrow_mut();
		let Some(w) = timers.get_mut(key) else {
			return false;
		};
		if w.enabled {
			w.enabled = false;
			w.generation = self.fresh_generation();
		}
		true
	}

	pub(crate) fn timer_enabled(&self, key: usize) -> bool {
		self.timers.borrow().get(key).is_some_and(|w| w.enabled)
	}

	pub(crate) fn remove_timer_watcher(&self, key: usize) {
		self.timers.borrow_mut().try_remove(key);
	}

	/// Earliest live deadline; lazily discards stale heap entries.
	fn next_deadline(&self) -> Option<u64> {
		let timers = self.timers.borrow();
		let mut heap = self.timer_heap.borrow_mut();
		while let Some(top) = heap.peek() {
			match timers.get(top.key) {
				Some(w) if w.enabled && w.generation == top.generation => return Some(top.deadline_ns),
				_ => {
					heap.pop();
				}
			}
		}
		None
	}
}

// signal watchers
impl LoopCore {
	pub(crate) fn add_signal_watcher(&self, callback: SignalCallback) -> usize {
		let generation = self.fresh_generation();
		self.signals.borrow_mut().insert(SignalWatcher {
			signo: 0,
			mode: Mode::Persist,
			enabled: false,
			generation,
			callback,
		})
	}

	pub(crate) fn set_signal(&self, key: usize, signo: i32, mode: Mode) {
		let mut signals = self.signals.borrow_mut();
		if let Some(w) = signals.get_mut(key) {
			w.signo = signo;
			w.mode = mode;
		}
	}

	pub(crate) fn enable_signal(&self, key: usize) -> Result<bool> {
		let signo = {
			let signals = self.signals.borrow();
			let Some(w) = signals.get(key) else {
				return Ok(false);
			};
			if w.signo == 0 {
				return Ok(false);
			}
			if w.enabled {
				return Ok(true);
			}
			w.signo
		};
		self.ensure_signal_slot()?;
		let slot = self.signal_slot.get().expect("slot allocated above");
		let first = {
			let mut refs = self.signal_refs.borrow_mut();
			let count = refs.entry(signo).or_insert(0);
			*count += 1;
			*count == 1
		};
		if first
			&& let Err(err) = signal_router::subscribe(slot, signo)
		{
			let mut refs = self.signal_refs.borrow_mut();
			refs.remove(&signo);
			return Err(err);
		}
		self.signals.borrow_mut()[key].enabled = true;
		tracing::trace!(signo, "signal subscription enabled");
		Ok(true)
	}

	pub(crate) fn disable_signal(&self, key: usize) -> bool {
		let signo = {
			let mut signals = self.signals.borrow_mut();
			let Some(w) = signals.get_mut(key) else {
				return false;
			};
			if !w.enabled {
				return true;
			}
			w.enabled = false;
			w.generation = self.fresh_generation();
			w.signo
		};
		self.release_signal_ref(signo);
		true
	}

	pub(crate) fn signal_enabled(&self, key: usize) -> bool {
		self.signals.borrow().get(key).is_some_and(|w| w.enabled)
	}

	pub(crate) fn remove_signal_watcher(&self, key: usize) {
		self.disable_signal(key);
		self.signals.borrow_mut().try_remove(key);
	}

	fn release_signal_ref(&self, signo: i32) {
		let last = {
			let mut refs = self.signal_refs.borrow_mut();
			match refs.get_mut(&signo) {
				Some(count) => {
					*count -= 1;
					if *count == 0 {
						refs.remove(&signo);
						true
					} else {
						false
					}
				}
				None => false,
			}
		};
		if last && let Some(slot) = self.signal_slot.get() {
			signal_router::unsubscribe(slot, signo);
		}
	}

	/// Allocates the router slot and self-pipe on first use. The read end is
	/// watched like any other fd; its callback just drains bytes.
	fn ensure_signal_slot(&self) -> Result<()> {
		if self.signal_slot.get().is_some() {
			return Ok(());
		}
		let (read, write) = pipe_with(PipeFlags::CLOEXEC | PipeFlags::NONBLOCK).map_err(io::Error::from)?;
		let slot = signal_router::acquire_slot(write.as_raw_fd())?;
		let read_raw = read.as_raw_fd();
		let drain: FdCallback = Rc::new(RefCell::new(Some(Box::new(move |_fired| {
			let fd = unsafe { BorrowedFd::borrow_raw(read_raw) };
			let mut buf = [0u8; 64];
			loop {
				match rustix::io::read(fd, &mut buf) {
					Ok(n) if n == buf.len() => continue,
					_ => break,
				}
			}
		}) as Box<dyn FnMut(EventMask)>)));
		let watcher = self.add_fd_watcher(read_raw, EventMask::READ, Mode::Persist, drain);
		if let Err(err) = self.enable_fd(watcher) {
			self.remove_fd_watcher(watcher);
			signal_router::release_slot(slot);
			return Err(err);
		}
		self.signal_pipe.borrow_mut().replace((read, write));
		self.signal_pipe_watcher.set(Some(watcher));
		self.signal_slot.set(Some(slot));
		Ok(())
	}
}

// dispatch cycle
impl LoopCore {
	pub(crate) fn should_exit(&self) -> bool {
		match *self.shared.exit.lock() {
			ExitRequest::None => false,
			ExitRequest::Now => true,
			ExitRequest::At(deadline) => now_ns() >= deadline,
		}
	}

	fn wait_timeout(&self) -> Option<Duration> {
		let mut deadline = self.next_deadline();
		if let ExitRequest::At(d) = *self.shared.exit.lock() {
			deadline = Some(deadline.map_or(d, |x| x.min(d)));
		}
		deadline.map(|d| Duration::from_nanos(d.saturating_sub(now_ns())))
	}

	/// One dispatch cycle: wait, then timers, fds, signals, and finally the
	/// cross-thread queue. `run_next` work drains after every callback and
	/// always before the next wait.
	pub(crate) fn run_once(&self) -> Result<()> {
		self.drain_run_next();
		let timeout = self.wait_timeout();
		let mut ready = Vec::new();
		self.poller.borrow_mut().wait(timeout, &mut ready)?;
		let plan = self.snapshot_fd_plan(&ready);
		self.dispatch_timers();
		self.dispatch_fds(plan);
		self.dispatch_signals();
		self.drain_cross();
		Ok(())
	}

	fn snapshot_fd_plan(&self, ready: &[(usize, EventMask)]) -> Vec<(usize, Vec<FdDispatch>)> {
		let records = self.fd_records.borrow();
		let watchers = self.fd_watchers.borrow();
		let mut plan = Vec::with_capacity(ready.len());
		for &(record, fired) in ready {
			let Some(rec) = records.get(record) else {
				continue;
			};
			let mut items = Vec::new();
			for &key in &rec.watchers {
				if let Some(w) = watchers.get(key) {
					let eff = fired & w.mask;
					if w.enabled && !eff.is_empty() {
						items.push(FdDispatch {
							watcher: key,
							fired: eff,
							generation: w.generation,
						});
					}
				}
			}
			if !items.is_empty() {
				plan.push((record, items));
			}
		}
		plan
	}

	fn dispatch_timers(&self) {
		let now = now_ns();
		loop {
			let entry = {
				let mut heap = self.timer_heap.borrow_mut();
				match heap.peek() {
					Some(top) if top.deadline_ns <= now => heap.pop().expect("peeked entry"),
					_ => break,
				}
			};
			let cb = {
				let mut timers = self.timers.borrow_mut();
				let Some(w) = timers.get_mut(entry.key) else {
					continue;
				};
				if !w.enabled || w.generation != entry.generation {
					continue;
				}
				match w.mode {
					Mode::Oneshot => w.enabled = false,
					Mode::Persist => {
						// Rate-monotonic: re-arm from the deadline, not from
						// the (possibly late) dispatch instant.
						let next = TimerDeadline {
							deadline_ns: entry.deadline_ns + w.interval_ns,
							seq: self.next_timer_seq(),
							key: entry.key,
							generation: entry.generation,
						};
						self.timer_heap.borrow_mut().push(next);
					}
				}
				w.callback.clone()
			};
			invoke_timer(&cb);
			self.drain_run_next();
		}
	}

	fn dispatch_fds(&self, plan: Vec<(usize, Vec<FdDispatch>)>) {
		let rearm = self.poller.borrow().oneshot_rearm();
		for (record, items) in plan {
			for item in items {
				let (cb, oneshot) = {
					let watchers = self.fd_watchers.borrow();
					let Some(w) = watchers.get(item.watcher) else {
						continue;
					};
					if !w.enabled || w.generation != item.generation {
						continue;
					}
					(w.callback.clone(), w.mode == Mode::Oneshot)
				};
				if oneshot {
					self.disable_fd(item.watcher);
				}
				invoke_fd(&cb, item.fired);
				self.drain_run_next();
			}
			if rearm {
				let still = {
					let records = self.fd_records.borrow();
					records.get(record).filter(|r| !r.registered.is_empty()).map(|r| (r.fd, r.registered))
				};
				if let Some((fd, mask)) = still
					&& let Err(err) = self.poller.borrow_mut().reregister(fd, record, mask)
				{
					tracing::warn!(fd, error = %err, "re-arm failed");
				}
			}
		}
	}

	fn dispatch_signals(&self) {
		let Some(slot) = self.signal_slot.get() else {
			return;
		};
		let pending = signal_router::take_pending(slot);
		if pending == 0 {
			return;
		}
		let plan: Vec<(usize, i32, u64)> = {
			let signals = self.signals.borrow();
			signals
				.iter()
				.filter(|(_, w)| w.enabled && (0..64).contains(&w.signo) && pending & (1 << w.signo) != 0)
				.map(|(key, w)| (key, w.signo, w.generation))
				.collect()
		};
		for (key, signo, generation) in plan {
			let (cb, oneshot) = {
				let signals = self.signals.borrow();
				let Some(w) = signals.get(key) else {
					continue;
				};
				if !w.enabled || w.generation != generation {
					continue;
				}
				(w.callback.clone(), w.mode == Mode::Oneshot)
			};
			if oneshot {
				self.disable_signal(key);
			}
			invoke_signal(&cb, signo);
			self.drain_run_next();
		}
	}

	pub(crate) fn drain_run_next(&self) {
		loop {
			let next = self.run_next.borrow_mut().pop_front();
			match next {
				Some(f) => f(),
				None => break,
			}
		}
	}

	fn drain_cross(&self) {
		let drained = {
			let mut queue = self.shared.queue.lock();
			std::mem::take(&mut *queue)
		};
		for f in drained {
			f();
			self.drain_run_next();
		}
	}
}
