//! Index lifecycle state machine (spec.md §4.D).
use std::sync::atomic::{AtomicU8, Ordering};

use crate::err::Error;

/// The lifecycle of a single index descriptor.
///
/// `Readable` is the only state that admits queries; `WriteOnly` accepts
/// maintenance writes but is invisible to readers; `Disabled` accepts
/// nothing. Transitions are strictly forward (`Disabled -> WriteOnly ->
/// Readable`); `make_readable` is idempotent once already `Readable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IndexState {
	Disabled = 0,
	WriteOnly = 1,
	Readable = 2,
}

impl IndexState {
	fn from_u8(v: u8) -> Self {
		match v {
			0 => IndexState::Disabled,
			1 => IndexState::WriteOnly,
			_ => IndexState::Readable,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			IndexState::Disabled => "disabled",
			IndexState::WriteOnly => "writeOnly",
			IndexState::Readable => "readable",
		}
	}
}

/// A shared, atomically-updated handle on an index's lifecycle state.
///
/// Reads and writes check this before touching the KV (spec.md §4.D:
/// "Reads MUST refuse to use an index not in readable. Writes MUST
/// maintain an index in writeOnly or readable"). Backed by an `AtomicU8`
/// rather than a lock since the only operations are a compare against a
/// total order of three values and a monotonic advance — the same
/// trade-off the teacher makes for its own per-index hot-path counters.
pub struct IndexStateMachine {
	state: AtomicU8,
}

impl IndexStateMachine {
	pub fn new(initial: IndexState) -> Self {
		Self {
			state: AtomicU8::new(initial as u8),
		}
	}

	pub fn disabled() -> Self {
		Self::new(IndexState::Disabled)
	}

	pub fn state(&self) -> IndexState {
		IndexState::from_u8(self.state.load(Ordering::Acquire))
	}

	/// `disabled -> writeOnly`.
	pub fn enable(&self) -> Result<(), Error> {
		match self.state() {
			IndexState::Disabled => {
				self.state.store(IndexState::WriteOnly as u8, Ordering::Release);
				Ok(())
			}
			other => Err(Error::InvalidTransition(format!(
				"enable requires disabled, found {}",
				other.as_str()
			))),
		}
	}

	/// `writeOnly -> readable`. Idempotent when already `readable`.
	pub fn make_readable(&self) -> Result<(), Error> {
		match self.state() {
			IndexState::WriteOnly | IndexState::Readable => {
				self.state.store(IndexState::Readable as u8, Ordering::Release);
				Ok(())
			}
			other => Err(Error::InvalidTransition(format!(
				"makeReadable requires writeOnly or readable, found {}",
				other.as_str()
			))),
		}
	}

	/// Fails unless this index admits reads.
	pub fn require_readable(&self, index_name: &str) -> Result<(), Error> {
		if self.state() == IndexState::Readable {
			Ok(())
		} else {
			Err(Error::IndexStateError {
				index: index_name.to_string(),
				state: self.state().as_str(),
				operation: "reads",
			})
		}
	}

	/// Fails unless this index admits maintenance writes.
	pub fn require_writable(&self, index_name: &str) -> Result<(), Error> {
		match self.state() {
			IndexState::WriteOnly | IndexState::Readable => Ok(()),
			IndexState::Disabled => Err(Error::IndexStateError {
				index: index_name.to_string(),
				state: self.state().as_str(),
				operation: "writes",
			}),
		}
	}
}

impl Default for IndexStateMachine {
	fn default() -> Self {
		Self::disabled()
	}
}
