//! Time-windowed leaderboard maintainer (spec.md §4.J).
//!
//! Per window: a `scores` sub-subspace keyed `(-score, PK) -> ()` (the sign
//! flip turns an ascending KV scan into descending score order) and a `byPk`
//! sub-subspace keyed `PK -> score` so `updateIndex` and `getRank` don't need
//! a full window scan to find an entry's current score. Grounded on the
//! teacher's own sign-flipped-score pattern for reverse-ordered range scans
//! (`idx/planner/plan.rs`'s handling of `ORDER BY ... DESC` over a numeric
//! index) generalized to a dedicated maintainer.
use std::collections::BTreeSet;

use crate::codec::{Element, Tuple};
use crate::err::Error;
use crate::idx::state::IndexStateMachine;
use crate::kvs::Transaction;
use crate::subspace::Subspace;
use crate::value::Value;

const TARGET: &str = "recordgraph_core::idx::leaderboard";

/// A rolling time bucket, `floor(now / windowSeconds)` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(pub i64);

/// The granularity a leaderboard buckets scores into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
	Hourly,
	Daily,
	Weekly,
	Custom(u64),
}

impl Window {
	pub fn seconds(&self) -> u64 {
		match self {
			Window::Hourly => 3600,
			Window::Daily => 86_400,
			Window::Weekly => 604_800,
			Window::Custom(s) => *s,
		}
	}

	/// `windowID = floor(now / windowSeconds)`.
	pub fn window_id(&self, now_epoch_seconds: i64) -> WindowId {
		WindowId(now_epoch_seconds.div_euclid(self.seconds() as i64))
	}
}

/// `{window, windowCount}` (spec.md §9's config objects table).
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
	pub window: Window,
	pub window_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
	pub window: WindowId,
	pub pk: Value,
	pub score: i64,
}

fn element_to_value(e: &Element) -> Value {
	match e {
		Element::Null => Value::Null,
		Element::Bool(b) => Value::Bool(*b),
		Element::Int(i) => Value::Int(*i),
		Element::Float(f) => Value::Float(*f),
		Element::String(s) => Value::String(s.clone()),
		Element::Bytes(b) => Value::Bytes(b.clone()),
		Element::Tuple(t) => Value::Tuple(t.iter().map(element_to_value).collect()),
	}
}

fn value_to_element(v: &Value) -> Element {
	match v {
		Value::Null => Element::Null,
		Value::Bool(b) => Element::Bool(*b),
		Value::Int(i) => Element::Int(*i),
		Value::Float(f) => Element::Float(*f),
		Value::String(s) => Element::String(s.clone()),
		Value::Bytes(b) => Element::Bytes(b.clone()),
		Value::Tuple(t) => Element::Tuple(t.iter().map(value_to_element).collect()),
	}
}

/// Maintains one leaderboard index.
pub struct LeaderboardMaintainer {
	name: String,
	subspace: Subspace,
	config: WindowConfig,
	state: IndexStateMachine,
}

impl LeaderboardMaintainer {
	pub fn new(name: impl Into<String>, subspace: Subspace, config: WindowConfig) -> Self {
		Self { name: name.into(), subspace, config, state: IndexStateMachine::disabled() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn config(&self) -> WindowConfig {
		self.config
	}

	pub fn state(&self) -> &IndexStateMachine {
		&self.state
	}

	fn window_subspace(&self, window: WindowId) -> Subspace {
		self.subspace.child(window.0)
	}

	fn scores_subspace(&self, window: WindowId) -> Subspace {
		self.window_subspace(window).child(0i64)
	}

	fn by_pk_subspace(&self, window: WindowId) -> Subspace {
		self.window_subspace(window).child(1i64)
	}

	fn score_key(&self, window: WindowId, score: i64, pk: &Value) -> Vec<u8> {
		self.scores_subspace(window).pack(&Tuple::new(vec![Element::Int(-score), value_to_element(pk)]))
	}

	fn by_pk_key(&self, window: WindowId, pk: &Value) -> Vec<u8> {
		self.by_pk_subspace(window).pack(&Tuple::new(vec![value_to_element(pk)]))
	}

	/// `updateIndex(old?, new?, txn)` (spec.md §4.J). A no-op when both
	/// images are present and identical, including equal score — the
	/// invariant spec.md calls out as "if the new score equals the old
	/// score, no KV I/O occurs".
	pub async fn update_index<T: Transaction>(
		&self,
		old: Option<&LeaderboardEntry>,
		new: Option<&LeaderboardEntry>,
		txn: &mut T,
	) -> Result<(), Error> {
		self.state.require_writable(&self.name)?;
		trace!(target: TARGET, index = %self.name, ?old, ?new, "update_index");

		if let (Some(o), Some(n)) = (old, new) {
			if o.window == n.window && o.pk == n.pk && o.score == n.score {
				debug!(target: TARGET, index = %self.name, "update_index: score unchanged, skipping I/O");
				return Ok(());
			}
		}

		if let Some(o) = old {
			txn.del(self.score_key(o.window, o.score, &o.pk)).await?;
			txn.del(self.by_pk_key(o.window, &o.pk)).await?;
		}
		if let Some(n) = new {
			txn.set(self.score_key(n.window, n.score, &n.pk), Vec::new()).await?;
			txn.set(self.by_pk_key(n.window, &n.pk), n.score.to_be_bytes().to_vec()).await?;
		}
		Ok(())
	}

	/// `getTopK(k, txn)`: ascending scan of `scores`, `PK` ascending on
	/// ties (score equality ties break on the packed tuple's second
	/// element, which is already `PK` in ascending order).
	pub async fn get_top_k<T: Transaction>(
		&self,
		window: WindowId,
		k: usize,
		txn: &mut T,
	) -> Result<Vec<(Value, i64)>, Error> {
		self.state.require_readable(&self.name)?;
		trace!(target: TARGET, index = %self.name, ?window, k, "get_top_k");
		let sub = self.scores_subspace(window);
		let (begin, end) = sub.range();
		let rows = txn.scan(begin..end, k as u32).await?;
		let mut out = Vec::with_capacity(rows.len());
		for (key, _) in rows {
			let tail = crate::codec::unpack(&key[sub.as_bytes().len()..])?;
			let (Some(Element::Int(neg_score)), Some(pk_elem)) = (tail.0.first(), tail.0.get(1)) else {
				error!(target: TARGET, index = %self.name, "get_top_k: malformed score key");
				return Err(Error::codec("malformed leaderboard score key"));
			};
			out.push((element_to_value(pk_elem), -neg_score));
		}
		Ok(out)
	}

	/// `getRank(PK, txn)`: 1-based rank, or `None` if `PK` has no entry in
	/// `window`.
	pub async fn get_rank<T: Transaction>(
		&self,
		window: WindowId,
		pk: &Value,
		txn: &mut T,
	) -> Result<Option<u64>, Error> {
		self.state.require_readable(&self.name)?;
		trace!(target: TARGET, index = %self.name, ?window, ?pk, "get_rank");
		let Some(score_bytes) = txn.get(self.by_pk_key(window, pk)).await? else {
			debug!(target: TARGET, index = %self.name, ?window, ?pk, "get_rank: no entry");
			return Ok(None);
		};
		let score = i64::from_be_bytes(score_bytes.try_into().map_err(|_| Error::codec("malformed score bytes"))?);

		let sub = self.scores_subspace(window);
		let (begin, _) = sub.range();
		let end = self.score_key(window, score, pk);
		let smaller = txn.scan(begin..end, 0).await?;
		Ok(Some(smaller.len() as u64 + 1))
	}

	/// `getAvailableWindows(txn)`: distinct window IDs with at least one
	/// entry under this index.
	pub async fn get_available_windows<T: Transaction>(&self, txn: &mut T) -> Result<Vec<WindowId>, Error> {
		self.state.require_readable(&self.name)?;
		trace!(target: TARGET, index = %self.name, "get_available_windows");
		let (begin, end) = self.subspace.range();
		let mut windows = BTreeSet::new();
		let mut cursor = begin;
		loop {
			let rows = txn.scan(cursor.clone()..end.clone(), 512).await?;
			if rows.is_empty() {
				break;
			}
			let exhausted = rows.len() < 512;
			for (key, _) in &rows {
				if let Ok(tail) = crate::codec::unpack(&key[self.subspace.as_bytes().len()..]) {
					if let Some(Element::Int(w)) = tail.0.first() {
						windows.insert(WindowId(*w));
					}
				}
			}
			let mut next = rows.last().unwrap().0.clone();
			next.push(0x00);
			cursor = next;
			if exhausted {
				break;
			}
		}
		Ok(windows.into_iter().collect())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kvs::{Datastore, MemoryDatastore};
	use crate::subspace::Directory;

	fn maintainer() -> LeaderboardMaintainer {
		let dir = Directory::new();
		let m = LeaderboardMaintainer::new(
			"season",
			dir.resolve(&["leaderboards", "season"]),
			WindowConfig { window: Window::Daily, window_count: 7 },
		);
		m.state().enable().unwrap();
		m.state().make_readable().unwrap();
		m
	}

	#[tokio::test]
	async fn top_k_orders_by_score_desc_pk_asc_scenario_5() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		let w = WindowId(1);
		for (pk, score) in [("p1", 100), ("p2", 500), ("p3", 1000)] {
			m.update_index(None, Some(&LeaderboardEntry { window: w, pk: Value::from(pk), score }), &mut tx)
				.await
				.unwrap();
		}
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let top2 = m.get_top_k(w, 2, &mut tx).await.unwrap();
		assert_eq!(top2, vec![(Value::from("p3"), 1000), (Value::from("p2"), 500)]);
	}

	#[tokio::test]
	async fn updating_score_changes_rank_scenario_5() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		let w = WindowId(1);
		for (pk, score) in [("p1", 100), ("p2", 500), ("p3", 1000)] {
			m.update_index(None, Some(&LeaderboardEntry { window: w, pk: Value::from(pk), score }), &mut tx)
				.await
				.unwrap();
		}
		let old = LeaderboardEntry { window: w, pk: Value::from("p1"), score: 100 };
		let new = LeaderboardEntry { window: w, pk: Value::from("p1"), score: 2000 };
		m.update_index(Some(&old), Some(&new), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let top2 = m.get_top_k(w, 2, &mut tx).await.unwrap();
		assert_eq!(top2, vec![(Value::from("p1"), 2000), (Value::from("p3"), 1000)]);
		let rank = m.get_rank(w, &Value::from("p2"), &mut tx).await.unwrap();
		assert_eq!(rank, Some(3));
	}

	#[tokio::test]
	async fn rank_of_absent_pk_is_none() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(false).await.unwrap();
		assert_eq!(m.get_rank(WindowId(1), &Value::from("ghost"), &mut tx).await.unwrap(), None);
	}

	#[tokio::test]
	async fn equal_score_update_performs_no_io() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		let w = WindowId(1);
		let e = LeaderboardEntry { window: w, pk: Value::from("p1"), score: 42 };
		m.update_index(Some(&e), Some(&e), &mut tx).await.unwrap();
		tx.commit().await.unwrap();
		let mut tx = ds.transaction(false).await.unwrap();
		let (b, e_) = m.subspace.range();
		assert!(tx.scan(b..e_, 0).await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn available_windows_enumerates_distinct_ids() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some(&LeaderboardEntry { window: WindowId(1), pk: Value::from("a"), score: 1 }), &mut tx)
			.await
			.unwrap();
		m.update_index(None, Some(&LeaderboardEntry { window: WindowId(2), pk: Value::from("b"), score: 1 }), &mut tx)
			.await
			.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let mut windows = m.get_available_windows(&mut tx).await.unwrap();
		windows.sort();
		assert_eq!(windows, vec![WindowId(1), WindowId(2)]);
	}
}
