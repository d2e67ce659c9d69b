//! Direct epoll backend.
//!
//! Level-triggered epoll with an eventfd as the self-wake primitive. This is
//! the default backend and the reference for delivery semantics: the other
//! backends approximate it within their own trigger models.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use rustix::event::{EventfdFlags, eventfd};

use super::{Poller, WAKE_TOKEN, Wake};
use crate::mask::EventMask;

const MAX_EVENTS: usize = 256;

fn interest_bits(mask: EventMask) -> u32 {
	let mut bits = 0u32;
	if mask.contains(EventMask::READ) {
		bits |= libc::EPOLLIN as u32;
	}
	if mask.contains(EventMask::WRITE) {
		bits |= libc::EPOLLOUT as u32;
	}
	if mask.contains(EventMask::EXCEPT) {
		bits |= libc::EPOLLPRI as u32;
	}
	bits
}

fn fired_mask(bits: u32) -> EventMask {
	let mut mask = EventMask::empty();
	if bits & (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0 {
		mask |= EventMask::READ;
	}
	if bits & (libc::EPOLLOUT | libc::EPOLLHUP | libc::EPOLLERR) as u32 != 0 {
		mask |= EventMask::WRITE;
	}
	if bits & (libc::EPOLLPRI | libc::EPOLLERR) as u32 != 0 {
		mask |= EventMask::EXCEPT;
	}
	mask
}

struct EventFdWaker {
	fd: OwnedFd,
}

impl Wake for EventFdWaker {
	fn wake(&self) {
		// A full counter (EAGAIN) already guarantees a pending wake-up.
		let _ = rustix::io::write(&self.fd, &1u64.to_ne_bytes());
	}
}

pub(crate) struct EpollPoller {
	ep: OwnedFd,
	waker: Arc<EventFdWaker>,
	buf: Vec<libc::epoll_event>,
}

impl EpollPoller {
	pub(crate) fn new() -> io::Result<Self> {
		let raw = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
		if raw < 0 {
			return Err(io::Error::last_os_error());
		}
		let ep = unsafe { OwnedFd::from_raw_fd(raw) };

		let wake_fd = eventfd(0, EventfdFlags::CLOEXEC | EventfdFlags::NONBLOCK).map_err(io::Error::from)?;
		let waker = Arc::new(EventFdWaker { fd: wake_fd });

		let poller = EpollPoller {
			ep,
			waker,
			buf: Vec::with_capacity(MAX_EVENTS),
		};
		poller.ctl(libc::EPOLL_CTL_ADD, poller.waker.fd.as_raw_fd(), libc::EPOLLIN as u32, WAKE_TOKEN)?;
		Ok(poller)
	}

	fn ctl(&self, op: libc::c_int, fd: RawFd, events: u32, token: usize) -> io::Result<()> {
		let mut ev = libc::epoll_event {
			events,
			u64: token as u64,
		};
		let rc = unsafe { libc::epoll_ctl(self.ep.as_raw_fd(), op, fd, &mut ev) };
		if rc < 0 { Err(io::Error::last_os_error()) } else { Ok(()) }
	}

	fn drain_wake(&self) {
		let mut buf = [0u8; 8];
		let _ = rustix::io::read(&self.waker.fd, &mut buf);
	}
}

impl Poller for EpollPoller {
	fn register(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_ADD, fd, interest_bits(mask), token)
	}

	fn reregister(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_MOD, fd, interest_bits(mask), token)
	}

	fn deregister(&mut self, fd: RawFd) -> io::Result<()> {
		self.ctl(libc::EPOLL_CTL_DEL, fd, 0, 0)
	}

	fn wait(&mut self, timeout: Option<Duration>, out: &mut Vec<(usize, EventMask)>) -> io::Result<()> {
		let timeout_ms = match timeout {
			None => -1,
			// Round up so sub-millisecond timeouts do not busy-loop.
			Some(d) => {
				let mut ms = d.as_millis();
				if d.subsec_nanos() % 1_000_000 != 0 {
					ms += 1;
				}
				i32::try_from(ms).unwrap_or(i32::MAX)
			}
		};
		let n = unsafe {
			self.buf.clear();
			libc::epoll_wait(self.ep.as_raw_fd(), self.buf.as_mut_ptr(), MAX_EVENTS as libc::c_int, timeout_ms)
		};
		if n < 0 {
			let err = io::Error::last_os_error();
			if err.kind() == io::ErrorKind::Interrupted {
				return Ok(());
			}
			return Err(err);
		}
		unsafe { self.buf.set_len(n as usize) };
		for ev in &self.buf {
			let token = ev.u64 as usize;
			if token == WAKE_TOKEN {
				self.drain_wake();
				continue;
			}
			out.push((token, fired_mask(ev.events)));
		}
		Ok(())
	}

	fn waker(&self) -> Arc<dyn Wake> {
		self.waker.clone()
	}
}
