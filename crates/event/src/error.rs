//! Error types for loop and backend construction.

use std::io;

use thiserror::Error;

use crate::engine::Backend;

/// Errors surfaced by loop factories and event registration.
///
/// State-machine misuse (enabling an uninitialized event, re-initializing
/// with a different fd) is not an error: those operations report `false`
/// and leave state unchanged.
#[derive(Debug, Error)]
pub enum Error {
	#[error("unknown backend tag `{0}` (expected epoll, mio, or polling)")]
	UnknownBackend(String),

	#[error("backend {0:?} was not compiled in")]
	BackendUnavailable(Backend),

	#[error("I/O error: {0}")]
	Io(#[from] io::Error),

	#[error("signal {0} cannot be routed")]
	InvalidSignal(i32),

	#[error("all signal routing slots are in use")]
	SignalSlotsExhausted,
}

/// Result type for loop operations.
pub type Result<T> = std::result::Result<T, Error>;
