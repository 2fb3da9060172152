//! Subspace & directory allocation (spec.md §4.C).
//!
//! Generalizes the teacher's fixed `*{ns}*{db}*{tb}` hierarchy
//! (`key/mod.rs`) to an arbitrary-depth path, since this crate's record
//! types and index names are not known ahead of time the way SurrealDB's
//! namespace/database/table schema is.
use dashmap::DashMap;

use crate::codec::{pack, range, Element, Tuple};

/// A namespaced byte-string prefix under which an index (or any other
/// component) stores its keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subspace {
	prefix: Vec<u8>,
}

impl Subspace {
	pub fn root() -> Self {
		Self {
			prefix: Vec::new(),
		}
	}

	fn from_prefix(prefix: Vec<u8>) -> Self {
		Self { prefix }
	}

	/// Packs `tuple` under this subspace's prefix.
	pub fn pack(&self, tuple: &Tuple) -> Vec<u8> {
		let mut k = self.prefix.clone();
		k.extend_from_slice(&pack(tuple).unwrap_or_default());
		k
	}

	/// The half-open range covering every key in this subspace.
	pub fn range(&self) -> (Vec<u8>, Vec<u8>) {
		let mut begin = self.prefix.clone();
		begin.push(0x00);
		let mut end = self.prefix.clone();
		end.push(0xff);
		(begin, end)
	}

	/// The half-open range covering every key in this subspace whose
	/// packed tuple has `tuple` as a proper prefix.
	pub fn range_for(&self, tuple: &Tuple) -> (Vec<u8>, Vec<u8>) {
		let (b, e) = range(tuple).unwrap_or_else(|_| (Vec::new(), Vec::new()));
		let mut begin = self.prefix.clone();
		begin.extend_from_slice(&b);
		let mut end = self.prefix.clone();
		end.extend_from_slice(&e);
		(begin, end)
	}

	/// A child subspace nested one level deeper, e.g. the `I` sub-subspace
	/// under a record type, or a numbered permutation sub-subspace under a
	/// graph index (spec.md §3's strategy-layout table).
	pub fn child(&self, segment: impl Into<Element>) -> Subspace {
		let t = Tuple::new(vec![segment.into()]);
		Subspace::from_prefix(self.pack(&t))
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.prefix
	}
}

/// Allocates and caches subspace prefixes for dotted paths.
///
/// Mirrors spec.md §6's directory-layer contract: `resolve(path) ->
/// subspace prefix bytes`, `remove(path)`. Each distinct path is assigned a
/// small monotonically increasing integer id on first resolution so that
/// prefixes stay short regardless of path name length, the same rationale
/// behind SurrealDB's namespace/database identifier tables
/// (`key::namespace::di`, `key::database::ti`).
#[derive(Default)]
pub struct Directory {
	ids: DashMap<Vec<String>, u32>,
	next_id: std::sync::atomic::AtomicU32,
}

impl Directory {
	pub fn new() -> Self {
		Self {
			ids: DashMap::new(),
			next_id: std::sync::atomic::AtomicU32::new(1),
		}
	}

	/// Resolves `path` to its subspace, allocating a fresh id if this is
	/// the first time `path` has been seen.
	pub fn resolve(&self, path: &[&str]) -> Subspace {
		let key: Vec<String> = path.iter().map(|s| s.to_string()).collect();
		let id = *self.ids.entry(key).or_insert_with(|| {
			self.next_id
				.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
		});
		Subspace::root().child(id as i64)
	}

	/// Forgets `path`'s allocation. Does not clear any data already written
	/// under the resulting subspace; that is the caller's responsibility
	/// (directory allocation is contract-only per spec.md §1).
	pub fn remove(&self, path: &[&str]) {
		let key: Vec<String> = path.iter().map(|s| s.to_string()).collect();
		self.ids.remove(&key);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolve_is_stable_and_distinct() {
		let dir = Directory::new();
		let a1 = dir.resolve(&["users", "I", "by_email"]);
		let a2 = dir.resolve(&["users", "I", "by_email"]);
		let b = dir.resolve(&["users", "I", "by_name"]);
		assert_eq!(a1, a2);
		assert_ne!(a1, b);
	}

	#[test]
	fn child_prefix_is_disjoint_from_sibling() {
		let dir = Directory::new();
		let base = dir.resolve(&["edges"]);
		let spo = base.child(2i64);
		let pos = base.child(3i64);
		assert!(!spo.as_bytes().is_empty());
		assert_ne!(spo, pos);
		let (b1, e1) = spo.range();
		let (b2, _e2) = pos.range();
		assert!(b2.as_slice() > e1.as_slice() || b2.as_slice() < b1.as_slice());
	}

	#[test]
	fn remove_allows_fresh_allocation() {
		let dir = Directory::new();
		let first = dir.resolve(&["tmp"]);
		dir.remove(&["tmp"]);
		let second = dir.resolve(&["tmp"]);
		// Removing only forgets the cache entry; a later resolve is free to
		// mint a new id (ids are never reused to avoid reviving stale data
		// under an old prefix).
		assert_ne!(first, second);
	}
}
