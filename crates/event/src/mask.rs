//! Event mask and delivery mode shared by all event kinds.

use bitflags::bitflags;

bitflags! {
	/// Readiness kinds an [`FdEvent`](crate::FdEvent) can subscribe to.
	///
	/// Callbacks receive the *fired* mask, which is always a subset of the
	/// subscribed mask.
	#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
	pub struct EventMask: u8 {
		const READ = 0b001;
		const WRITE = 0b010;
		const EXCEPT = 0b100;
	}
}

/// Whether an event auto-disables after its first delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
	/// Deliver once, then disable. The event stays initialized and can be
	/// re-enabled.
	Oneshot,
	/// Deliver on every occurrence until disabled.
	Persist,
}
