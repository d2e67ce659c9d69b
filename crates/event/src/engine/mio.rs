//! `mio` reactor backend.
//!
//! Edge-triggered underneath: a persistent subscription re-fires only on new
//! readiness, so callbacks are expected to drain the fd (the same contract
//! mio imposes on its own users). `EPOLL_CTL_MOD` re-arms an already-ready
//! fd, which is what makes disable/enable round-trips observable here.

use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};

use super::{Poller, WAKE_TOKEN, Wake};
use crate::mask::EventMask;

const EVENT_CAPACITY: usize = 256;

fn interest(mask: EventMask) -> Option<Interest> {
	let mut acc: Option<Interest> = None;
	let mut add = |i: Interest| {
		acc = Some(match acc {
			Some(prev) => prev.add(i),
			None => i,
		});
	};
	if mask.contains(EventMask::READ) {
		add(Interest::READABLE);
	}
	if mask.contains(EventMask::WRITE) {
		add(Interest::WRITABLE);
	}
	if mask.contains(EventMask::EXCEPT) {
		add(Interest::PRIORITY);
	}
	acc
}

fn fired_mask(event: &mio::event::Event) -> EventMask {
	let mut mask = EventMask::empty();
	if event.is_readable() || event.is_read_closed() {
		mask |= EventMask::READ;
	}
	if event.is_writable() || event.is_write_closed() {
		mask |= EventMask::WRITE;
	}
	if event.is_priority() {
		mask |= EventMask::EXCEPT;
	}
	if event.is_error() {
		mask |= EventMask::READ | EventMask::WRITE | EventMask::EXCEPT;
	}
	mask
}

struct MioWaker {
	waker: mio::Waker,
}

impl Wake for MioWaker {
	fn wake(&self) {
		let _ = self.waker.wake();
	}
}

pub(crate) struct MioPoller {
	poll: Poll,
	events: Events,
	waker: Arc<MioWaker>,
}

impl MioPoller {
	pub(crate) fn new() -> io::Result<Self> {
		let poll = Poll::new()?;
		let waker = mio::Waker::new(poll.registry(), Token(WAKE_TOKEN))?;
		Ok(MioPoller {
			poll,
			events: Events::with_capacity(EVENT_CAPACITY),
			waker: Arc::new(MioWaker { waker }),
		})
	}
}

impl Poller for MioPoller {
	fn register(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		let Some(interest) = interest(mask) else {
			return Err(io::Error::from(io::ErrorKind::InvalidInput));
		};
		self.poll.registry().register(&mut SourceFd(&fd), Token(token), interest)
	}

	fn reregister(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		let Some(interest) = interest(mask) else {
			return Err(io::Error::from(io::ErrorKind::InvalidInput));
		};
		self.poll.registry().reregister(&mut SourceFd(&fd), Token(token), interest)
	}

	fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
		self.poll.registry().deregister(&mut SourceFd(&fd))
	}

	fn wait(&mut self, timeout: Option<Duration>, out: &mut Vec<(usize, EventMask)>) -> io::Result<()> {
		if let Err(err) = self.poll.poll(&mut self.events, timeout) {
			if err.kind() == io::ErrorKind::Interrupted {
				return Ok(());
			}
			return Err(err);
		}
		for event in self.events.iter() {
			if event.token().0 == WAKE_TOKEN {
				continue;
			}
			out.push((event.token().0, fired_mask(event)));
		}
		Ok(())
	}

	fn waker(&self) -> Arc<dyn Wake> {
		self.waker.clone()
	}
}
