//! The external KV contract (spec.md §6), as consumed by every index
//! maintainer and scanner in this crate.
//!
//! Shape mirrors the teacher's `kvs::api::Transaction` trait: async
//! fn-in-trait methods keyed by `Into<Key>`/`Into<Val>` so call sites can
//! pass owned or borrowed byte strings interchangeably.
use std::future::Future;
use std::ops::Range;

use crate::err::Error;
use crate::kvs::{Key, Val};

/// A set of undoable updates and requests against the dataset, scoped to a
/// single atomic commit (spec.md §6: `withTransaction(f) -> T`).
pub trait Transaction: Send {
	/// True once this transaction has committed or been cancelled.
	fn closed(&self) -> bool;

	/// Cancel the transaction. No mutation issued against it becomes
	/// visible to subsequent readers.
	fn cancel(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

	/// Commit the transaction. All mutations issued against it become
	/// visible to subsequent readers atomically (spec.md §5: "Ordering
	/// guarantees").
	fn commit(&mut self) -> impl Future<Output = Result<(), Error>> + Send;

	/// Check whether `key` exists.
	fn exi<K>(&mut self, key: K) -> impl Future<Output = Result<bool, Error>> + Send
	where
		K: Into<Key> + Send;

	/// Fetch `key`'s value, if present.
	fn get<K>(&mut self, key: K) -> impl Future<Output = Result<Option<Val>, Error>> + Send
	where
		K: Into<Key> + Send;

	/// Insert or overwrite `key` with `val`.
	fn set<K, V>(&mut self, key: K, val: V) -> impl Future<Output = Result<(), Error>> + Send
	where
		K: Into<Key> + Send,
		V: Into<Val> + Send;

	/// Remove `key`, if present. Removing an absent key is not an error —
	/// index maintainers routinely issue a `clear` for an old image that
	/// was never actually written (e.g. a stored field that was nil).
	fn del<K>(&mut self, key: K) -> impl Future<Output = Result<(), Error>> + Send
	where
		K: Into<Key> + Send;

	/// Clear every key in `rng`, in ascending order, up to `limit` (`0`
	/// meaning unbounded). Used for `clearRange`-style bulk deletes (e.g.
	/// reaping a leaderboard window).
	fn clear_range<K>(
		&mut self,
		rng: Range<K>,
		limit: u32,
	) -> impl Future<Output = Result<(), Error>> + Send
	where
		K: Into<Key> + Send;

	/// Retrieve up to `limit` (`0` meaning unbounded) key/value pairs from
	/// `rng`, in ascending key order (spec.md §5: "Within one scan, KV
	/// yields keys in sorted order").
	fn scan<K>(
		&mut self,
		rng: Range<K>,
		limit: u32,
	) -> impl Future<Output = Result<Vec<(Key, Val)>, Error>> + Send
	where
		K: Into<Key> + Send;
}

/// The entry point a host application uses to run a unit of work atomically
/// (spec.md §6: `withTransaction(f) -> T`).
pub trait Datastore {
	type Tx: Transaction;

	/// Begin a transaction. `write` selects whether mutations are allowed.
	fn transaction(&self, write: bool) -> impl Future<Output = Result<Self::Tx, Error>> + Send;
}
