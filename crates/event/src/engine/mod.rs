//! Pluggable readiness backends.
//!
//! A backend multiplexes fd readiness only; timers and signal routing are
//! layered generically above it by the loop. Three implementations exist:
//! raw epoll (always built on Linux), and the `mio` / `polling` reactor
//! crates behind the `backend-mio` / `backend-polling` features.

mod epoll;
#[cfg(feature = "backend-mio")]
mod mio;
#[cfg(feature = "backend-polling")]
mod polling;

use std::io;
use std::os::fd::RawFd;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::mask::EventMask;

/// Token reserved for the backend's internal self-wake primitive. Never
/// handed out to watchers.
pub(crate) const WAKE_TOKEN: usize = usize::MAX;

/// Selects the readiness backend a [`Loop`](crate::Loop) is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
	/// Direct epoll via `rustix`/`libc`.
	Epoll,
	/// The `mio` reactor (edge-triggered epoll underneath).
	Mio,
	/// The `polling` reactor (oneshot-mode epoll underneath).
	Polling,
}

impl Backend {
	/// Whether this backend was compiled in.
	pub fn is_available(self) -> bool {
		match self {
			Backend::Epoll => true,
			Backend::Mio => cfg!(feature = "backend-mio"),
			Backend::Polling => cfg!(feature = "backend-polling"),
		}
	}

	/// All backends compiled into this build.
	pub fn available() -> Vec<Backend> {
		[Backend::Epoll, Backend::Mio, Backend::Polling]
			.into_iter()
			.filter(|b| b.is_available())
			.collect()
	}
}

impl FromStr for Backend {
	type Err = Error;

	fn from_str(tag: &str) -> Result<Backend> {
		match tag {
			"epoll" => Ok(Backend::Epoll),
			"mio" => Ok(Backend::Mio),
			"polling" => Ok(Backend::Polling),
			other => Err(Error::UnknownBackend(other.to_string())),
		}
	}
}

/// Cross-thread (and async-signal-safe where the backend allows) wake-up of
/// a blocked [`Poller::wait`].
pub(crate) trait Wake: Send + Sync {
	fn wake(&self);
}

/// Capability set every backend supplies.
///
/// Tokens are opaque to the backend; the loop maps them back to fd records.
pub(crate) trait Poller {
	fn register(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()>;
	fn reregister(&mut self, fd: RawFd, token: usize, mask: EventMask) -> io::Result<()>;
	fn deregister(&mut self, fd: RawFd) -> io::Result<()>;

	/// Blocks up to `timeout` (`None` blocks indefinitely) and appends
	/// `(token, fired_mask)` pairs to `out`. Interruption by a signal is not
	/// an error; the call returns with no events.
	fn wait(&mut self, timeout: Option<Duration>, out: &mut Vec<(usize, EventMask)>) -> io::Result<()>;

	/// Self-wake primitive usable from any thread.
	fn waker(&self) -> Arc<dyn Wake>;

	/// True when the backend disarms an fd after each delivery and the loop
	/// must re-register to keep a persistent subscription alive.
	fn oneshot_rearm(&self) -> bool {
		false
	}
}

/// Produces the backend implementation, or
/// [`Error::BackendUnavailable`] when it was compiled out.
pub(crate) fn new(backend: Backend) -> Result<Box<dyn Poller>> {
	let poller = match backend {
		Backend::Epoll => Box::new(self::epoll::EpollPoller::new()?) as Box<dyn Poller>,
		Backend::Mio => new_mio()?,
		Backend::Polling => new_polling()?,
	};
	tracing::debug!(?backend, "engine created");
	Ok(poller)
}

#[cfg(feature = "backend-mio")]
fn new_mio() -> Result<Box<dyn Poller>> {
	Ok(Box::new(self::mio::MioPoller::new()?))
}

#[cfg(not(feature = "backend-mio"))]
fn new_mio() -> Result<Box<dyn Poller>> {
	Err(Error::BackendUnavailable(Backend::Mio))
}

#[cfg(feature = "backend-polling")]
fn new_polling() -> Result<Box<dyn Poller>> {
	Ok(Box::new(self::polling::PollingPoller::new()?))
}

#[cfg(not(feature = "backend-polling"))]
fn new_polling() -> Result<Box<dyn Poller>> {
	Err(Error::BackendUnavailable(Backend::Polling))
}
