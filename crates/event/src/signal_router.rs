//! Process-global signal routing.
//!
//! Loops with signal subscriptions occupy slots in a fixed table. The
//! installed handler touches only atomics and `write(2)`: it sets the
//! pending bit for every loop subscribed to the signal and writes one byte
//! into that loop's self-pipe. All bookkeeping (slot allocation, handler
//! install/restore, subscriber counting) happens on the normal path under a
//! mutex the handler never takes.

use std::io;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use parking_lot::Mutex;

use crate::error::{Error, Result};

const MAX_SLOTS: usize = 64;
const MAX_SIGNO: usize = 64;

struct Slot {
	/// Bit per signo pending for this loop since its last dispatch.
	pending: AtomicU64,
	/// Write end of the loop's self-pipe, or -1 when the slot is free.
	wake_fd: AtomicI32,
}

static SLOTS: [Slot; MAX_SLOTS] = [const {
	Slot {
		pending: AtomicU64::new(0),
		wake_fd: AtomicI32::new(-1),
	}
}; MAX_SLOTS];

/// Bit per slot subscribed to each signo. The only cross-reference the
/// handler follows.
static SUBSCRIBERS: [AtomicU64; MAX_SIGNO] = [const { AtomicU64::new(0) }; MAX_SIGNO];

struct Registry {
	used_slots: u64,
	sub_counts: [u32; MAX_SIGNO],
	saved: [Option<SigAction>; MAX_SIGNO],
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry {
	used_slots: 0,
	sub_counts: [0; MAX_SIGNO],
	saved: [const { None }; MAX_SIGNO],
});

extern "C" fn route_signal(signo: libc::c_int) {
	let idx = signo as usize;
	if idx >= MAX_SIGNO {
		return;
	}
	let mut subs = SUBSCRIBERS[idx].load(Ordering::Acquire);
	while subs != 0 {
		let slot = subs.trailing_zeros() as usize;
		subs &= subs - 1;
		SLOTS[slot].pending.fetch_or(1 << idx, Ordering::Release);
		let fd = SLOTS[slot].wake_fd.load(Ordering::Acquire);
		if fd >= 0 {
			let byte = [1u8];
			unsafe { libc::write(fd, byte.as_ptr().cast(), 1) };
		}
	}
}

pub(crate) fn acquire_slot(wake_fd: RawFd) -> Result<usize> {
	let mut registry = REGISTRY.lock();
	let slot = (0..MAX_SLOTS)
		.find(|&i| registry.used_slots & (1 << i) == 0)
		.ok_or(Error::SignalSlotsExhausted)?;
	registry.used_slots |= 1 << slot;
	SLOTS[slot].pending.store(0, Ordering::Release);
	SLOTS[slot].wake_fd.store(wake_fd, Ordering::Release);
	Ok(slot)
}

pub(crate) fn release_slot(slot: usize) {
	let mut registry = REGISTRY.lock();
	for signo in SUBSCRIBERS.iter() {
		signo.fetch_and(!(1 << slot), Ordering::AcqRel);
	}
	SLOTS[slot].wake_fd.store(-1, Ordering::Release);
	SLOTS[slot].pending.store(0, Ordering::Release);
	registry.used_slots &= !(1 << slot);
}

pub(crate) fn subscribe(slot: usize, signo: i32) -> Result<()> {
	let idx = usize::try_from(signo)
		.ok()
		.filter(|&i| i > 0 && i < MAX_SIGNO)
		.ok_or(Error::InvalidSignal(signo))?;
	let signal = Signal::try_from(signo).map_err(|_| Error::InvalidSignal(signo))?;
	let mut registry = REGISTRY.lock();
	// Publish the subscription before the handler can run.
	SUBSCRIBERS[idx].fetch_or(1 << slot, Ordering::AcqRel);
	if registry.sub_counts[idx] == 0 {
		let action = SigAction::new(SigHandler::Handler(route_signal), SaFlags::SA_RESTART, SigSet::empty());
		match unsafe { sigaction(signal, &action) } {
			Ok(previous) => {
				registry.saved[idx] = Some(previous);
				tracing::debug!(signo, "signal disposition installed");
			}
			Err(errno) => {
				SUBSCRIBERS[idx].fetch_and(!(1 << slot), Ordering::AcqRel);
				return Err(Error::Io(io::Error::from_raw_os_error(errno as i32)));
			}
		}
	}
	registry.sub_counts[idx] += 1;
	Ok(())
}

pub(crate) fn unsubscribe(slot: usize, signo: i32) {
	let Ok(idx) = usize::try_from(signo) else {
		return;
	};
	if idx == 0 || idx >= MAX_SIGNO {
		return;
	}
	let mut registry = REGISTRY.lock();
	SUBSCRIBERS[idx].fetch_and(!(1 << slot), Ordering::AcqRel);
	if registry.sub_counts[idx] == 0 {
		return;
	}
	registry.sub_counts[idx] -= 1;
	if registry.sub_counts[idx] == 0
		&& let Some(previous) = registry.saved[idx].take()
		&& let Ok(signal) = Signal::try_from(signo)
	{
		let _ = unsafe { sigaction(signal, &previous) };
		tracing::debug!(signo, "signal disposition restored");
	}
}

/// Fetches and clears the pending signo bitmask for one loop.
pub(crate) fn take_pending(slot: usize) -> u64 {
	SLOTS[slot].pending.swap(0, Ordering::AcqRel)
}
