//! `polling` reactor backend.
//!
//! `polling` delivers in oneshot mode: an fd is disarmed after every
//! delivery, so [`Poller::oneshot_rearm`] reports true and the loop
//! re-registers persistent subscriptions after dispatch. There is no
//! priority-band interest here; `EXCEPT` folds into readability.

use std::io;
use std::os::fd::{BorrowedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use polling::{Event, Events};

use super::{Poller, Wake};
use crate::mask::EventMask;

fn interest(mask: EventMask, token: usize) -> Event {
	let readable = mask.intersects(EventMask::READ | EventMask::EXCEPT);
	let writable = mask.contains(EventMask::WRITE);
	match (readable, writable) {
		(true, true) => Event::all(token),
		(true, false) => Event::readable(token),
		(false, true) => Event::writable(token),
		(false, false) => Event::none(token),
	}
}

struct PollingWaker {
	poller: Arc<polling::Poller>,
}

impl Wake for PollingWaker {
	fn wake(&self) {
		let _ = self.poller.notify();
	}
}

pub(crate) struct PollingPoller {
	poller: Arc<polling::Poller>,
	events: Events,
	waker: Arc<PollingWaker>,
}

impl PollingPoller {
	pub(crate) fn new() -> io::Result<Self> {
		let poller = Arc::new(polling::Poller::new()?);
		let waker = Arc::new(PollingWaker { poller: poller.clone() });
		Ok(PollingPoller {
			poller,
			events: Events::new(),
			waker,
		})
	}
}

impl Poller for PollingPoller {
	fn register(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		unsafe { self.poller.add(fd, interest(mask, token)) }
	}

	fn reregister(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		let fd = unsafe { BorrowedFd::borrow_raw(fd) };
		self.poller.modify(fd, interest(mask, token))
	}

	fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
		let fd = unsafe { BorrowedFd::borrow_raw(fd) };
		self.poller.delete(fd)
	}

	fn wait(&mut self, timeout: Option<Duration>, out: &mut Vec<(usize, EventMask)>) -> io::Result<()> {
		self.events.clear();
		if let Err(err) = self.poller.wait(&mut self.events, timeout) {
			if err.kind() == io::ErrorKind::Interrupted {
				return Ok(());
			}
			return Err(err);
		}
		for event in self.events.iter() {
			let mut mask = EventMask::empty();
			if event.readable {
				mask |= EventMask::READ | EventMask::EXCEPT;
			}
			if event.writable {
				mask |= EventMask::WRITE;
			}
			out.push((event.key, mask));
		}
		Ok(())
	}

	fn waker(&self) -> Arc<dyn Wake> {
		self.waker.clone()
	}

	fn oneshot_rearm(&self) -> bool {
		true
	}
}
