//! An in-memory reference implementation of the KV contract (spec.md §4.A).
//!
//! Not a production backend — no WAL, no MVCC, no conflict detection beyond
//! single-writer mutual exclusion. It exists so this crate's own test suite
//! can drive every index maintainer end to end without a host KV driver.
//! Structured like the teacher's per-backend modules (`kvs/mem.rs` there
//! wraps `echodb`; this one wraps a `BTreeMap` behind a `parking_lot::Mutex`,
//! the same lock the teacher reaches for throughout `kvs`/`dbs`).
use std::collections::BTreeMap;
use std::ops::Bound;
use std::ops::Range;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::err::Error;
use crate::kvs::api::{Datastore, Transaction};
use crate::kvs::{Key, Val};

#[derive(Default)]
struct Inner {
	data: BTreeMap<Key, Val>,
}

/// A single in-process store. Cheap to clone (shares the underlying map).
#[derive(Clone, Default)]
pub struct MemoryDatastore {
	inner: Arc<Mutex<Inner>>,
}

impl MemoryDatastore {
	pub fn new() -> Self {
		Self::default()
	}
}

impl Datastore for MemoryDatastore {
	type Tx = MemoryTransaction;

	async fn transaction(&self, write: bool) -> Result<Self::Tx, Error> {
		Ok(MemoryTransaction {
			store: self.inner.clone(),
			// A snapshot of the committed state at open time, so that
			// reads inside this transaction are isolated from concurrent
			// writers, matching spec.md §5's "Leaderboard queries against
			// a single window observe a consistent snapshot" guarantee
			// generalized to every scan.
			snapshot: self.inner.lock().data.clone(),
			writes: BTreeMap::new(),
			write,
			closed: false,
		})
	}
}

enum PendingWrite {
	Set(Val),
	Del,
}

/// A transaction against a [`MemoryDatastore`].
///
/// Writes are buffered in `writes` and only applied to the shared store on
/// [`commit`](Transaction::commit); `cancel` simply drops them.
pub struct MemoryTransaction {
	store: Arc<Mutex<Inner>>,
	snapshot: BTreeMap<Key, Val>,
	writes: BTreeMap<Key, PendingWrite>,
	write: bool,
	closed: bool,
}

impl MemoryTransaction {
	fn check_open(&self) -> Result<(), Error> {
		if self.closed {
			return Err(Error::TxFinished);
		}
		Ok(())
	}

	fn check_writable(&self) -> Result<(), Error> {
		self.check_open()?;
		if !self.write {
			return Err(Error::TxReadonly);
		}
		Ok(())
	}

	fn lookup(&self, key: &[u8]) -> Option<Val> {
		match self.writes.get(key) {
			Some(PendingWrite::Set(v)) => Some(v.clone()),
			Some(PendingWrite::Del) => None,
			None => self.snapshot.get(key).cloned(),
		}
	}
}

impl Transaction for MemoryTransaction {
	fn closed(&self) -> bool {
		self.closed
	}

	async fn cancel(&mut self) -> Result<(), Error> {
		self.closed = true;
		self.writes.clear();
		Ok(())
	}

	async fn commit(&mut self) -> Result<(), Error> {
		self.check_open()?;
		let mut guard: MutexGuard<'_, Inner> = self.store.lock();
		for (k, w) in std::mem::take(&mut self.writes) {
			match w {
				PendingWrite::Set(v) => {
					guard.data.insert(k, v);
				}
				PendingWrite::Del => {
					guard.data.remove(&k);
				}
			}
		}
		self.closed = true;
		Ok(())
	}

	async fn exi<K>(&mut self, key: K) -> Result<bool, Error>
	where
		K: Into<Key> + Send,
	{
		self.check_open()?;
		Ok(self.lookup(&key.into()).is_some())
	}

	async fn get<K>(&mut self, key: K) -> Result<Option<Val>, Error>
	where
		K: Into<Key> + Send,
	{
		self.check_open()?;
		Ok(self.lookup(&key.into()))
	}

	async fn set<K, V>(&mut self, key: K, val: V) -> Result<(), Error>
	where
		K: Into<Key> + Send,
		V: Into<Val> + Send,
	{
		self.check_writable()?;
		self.writes.insert(key.into(), PendingWrite::Set(val.into()));
		Ok(())
	}

	async fn del<K>(&mut self, key: K) -> Result<(), Error>
	where
		K: Into<Key> + Send,
	{
		self.check_writable()?;
		self.writes.insert(key.into(), PendingWrite::Del);
		Ok(())
	}

	async fn clear_range<K>(&mut self, rng: Range<K>, limit: u32) -> Result<(), Error>
	where
		K: Into<Key> + Send,
	{
		self.check_writable()?;
		let keys = self.scan_keys(rng.start.into()..rng.end.into(), limit);
		for k in keys {
			self.writes.insert(k, PendingWrite::Del);
		}
		Ok(())
	}

	async fn scan<K>(&mut self, rng: Range<K>, limit: u32) -> Result<Vec<(Key, Val)>, Error>
	where
		K: Into<Key> + Send,
	{
		self.check_open()?;
		let begin: Key = rng.start.into();
		let end: Key = rng.end.into();
		let mut merged: BTreeMap<Key, Option<Val>> = BTreeMap::new();
		for (k, v) in self.snapshot.range((Bound::Included(begin.clone()), Bound::Excluded(end.clone()))) {
			merged.insert(k.clone(), Some(v.clone()));
		}
		for (k, w) in self.writes.range((Bound::Included(begin), Bound::Excluded(end))) {
			match w {
				PendingWrite::Set(v) => {
					merged.insert(k.clone(), Some(v.clone()));
				}
				PendingWrite::Del => {
					merged.insert(k.clone(), None);
				}
			}
		}
		let mut out: Vec<(Key, Val)> =
			merged.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect();
		if limit > 0 {
			out.truncate(limit as usize);
		}
		Ok(out)
	}
}

impl MemoryTransaction {
	fn scan_keys(&self, rng: Range<Key>, limit: u32) -> Vec<Key> {
		let mut merged: BTreeMap<Key, bool> = BTreeMap::new();
		for k in self
			.snapshot
			.range((Bound::Included(rng.start.clone()), Bound::Excluded(rng.end.clone())))
			.map(|(k, _)| k.clone())
		{
			merged.insert(k, true);
		}
		for (k, w) in self
			.writes
			.range((Bound::Included(rng.start), Bound::Excluded(rng.end)))
		{
			merged.insert(k.clone(), !matches!(w, PendingWrite::Del));
		}
		let mut out: Vec<Key> = merged.into_iter().filter(|(_, present)| *present).map(|(k, _)| k).collect();
		if limit > 0 {
			out.truncate(limit as usize);
		}
		out
	}
}
