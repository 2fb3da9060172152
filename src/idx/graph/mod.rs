//! Graph-index maintainer (spec.md §4.F).
//!
//! Encodes a logical edge `(from, predicate, to, graph?, pk, storedProps?)`
//! under one of three storage strategies. Grounded on the teacher's
//! `key::graph` module: the graph element is appended after the `(S, P, O)`
//! permutation and before `PK`, exactly as `key/graph/mod.rs`'s `Graph<'a>`
//! struct appends `eg` (edge direction) and `fk` (foreign key) after the
//! `(ns, db, tb, id)` prefix.
pub mod path;
pub mod scanner;

use std::collections::BTreeMap;

use crate::codec::{Element, Tuple};
use crate::err::Error;
use crate::idx::state::IndexStateMachine;
use crate::kvs::Transaction;
use crate::subspace::Subspace;
use crate::value::Value;

const TARGET: &str = "recordgraph_core::idx::graph";

pub use scanner::{PropertyFilter, PropertyOp};

/// Which permutations of `(S, P, O)` a graph index materializes (spec.md
/// §3's strategy-layout table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
	TripleStore,
	Hexastore,
	Adjacency,
}

/// A storage permutation within a strategy: a name (for tie-breaking) plus
/// the sub-subspace number it lives under and the projection it applies to
/// `(S, P, O)` before appending `graph?` and `PK`.
#[derive(Debug, Clone, Copy)]
struct Permutation {
	name: &'static str,
	sub: i64,
	order: [Component; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
	S,
	P,
	O,
}

const TRIPLE_STORE_PERMS: &[Permutation] = &[
	Permutation { name: "spo", sub: 2, order: [Component::S, Component::P, Component::O] },
	Permutation { name: "pos", sub: 3, order: [Component::P, Component::O, Component::S] },
	Permutation { name: "osp", sub: 4, order: [Component::O, Component::S, Component::P] },
];

const HEXASTORE_PERMS: &[Permutation] = &[
	Permutation { name: "spo", sub: 2, order: [Component::S, Component::P, Component::O] },
	Permutation { name: "pos", sub: 3, order: [Component::P, Component::O, Component::S] },
	Permutation { name: "osp", sub: 4, order: [Component::O, Component::S, Component::P] },
	Permutation { name: "sop", sub: 5, order: [Component::S, Component::O, Component::P] },
	Permutation { name: "pso", sub: 6, order: [Component::P, Component::S, Component::O] },
	Permutation { name: "ops", sub: 7, order: [Component::O, Component::P, Component::S] },
];

const ADJACENCY_OUT: Permutation =
	Permutation { name: "out", sub: 0, order: [Component::P, Component::S, Component::O] };
const ADJACENCY_IN: Permutation =
	Permutation { name: "in", sub: 1, order: [Component::P, Component::O, Component::S] };
const ADJACENCY_PERMS: &[Permutation] = &[ADJACENCY_OUT, ADJACENCY_IN];

impl Strategy {
	fn permutations(&self) -> &'static [Permutation] {
		match self {
			Strategy::TripleStore => TRIPLE_STORE_PERMS,
			Strategy::Hexastore => HEXASTORE_PERMS,
			Strategy::Adjacency => ADJACENCY_PERMS,
		}
	}

	/// The number of KV mutations one edge produces (spec.md §8, P3).
	pub fn mutations_per_edge(&self) -> usize {
		self.permutations().len()
	}
}

/// A logical graph edge (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
	pub from: Value,
	pub predicate: Value,
	pub to: Value,
	pub graph: Option<Value>,
	pub pk: Value,
	pub stored_props: Option<BTreeMap<String, Option<Value>>>,
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

/// Encodes the value bytes for a permutation entry: the stored fields
/// present on the edge, as `(fieldName, fieldValue)` pairs. A field that
/// was nil at write time is simply absent from this tuple (spec.md §4.G's
/// null-vs-empty contract relies on this).
fn encode_stored_props(fields: &[String], props: &Option<BTreeMap<String, Option<Value>>>) -> Tuple {
	let mut elements = Vec::new();
	if let Some(props) = props {
		for name in fields {
			if let Some(Some(v)) = props.get(name) {
				elements.push(Element::String(name.clone()));
				elements.push(value_to_element(v));
			}
		}
	}
	Tuple::new(elements)
}

pub(crate) fn decode_stored_props(fields: &[String], bytes: &[u8]) -> Result<BTreeMap<String, Value>, Error> {
	let tuple = crate::codec::unpack(bytes)?;
	let mut out = BTreeMap::new();
	let mut it = tuple.0.into_iter();
	while let (Some(Element::String(name)), Some(val)) = (it.next(), it.next()) {
		if fields.contains(&name) {
			out.insert(name, element_to_value(&val));
		}
	}
	Ok(out)
}

fn project(order: [Component; 3], edge: &Edge) -> [Element; 3] {
	let pick = |c: Component| match c {
		Component::S => value_to_element(&edge.from),
		Component::P => value_to_element(&edge.predicate),
		Component::O => value_to_element(&edge.to),
	};
	[pick(order[0]), pick(order[1]), pick(order[2])]
}

/// Builds the full key tuple for one permutation of `edge`: the permuted
/// `(S, P, O)`, then `graph` if present (always last before `PK`, per
/// spec.md §3), then `PK`.
fn key_tuple(order: [Component; 3], edge: &Edge) -> Tuple {
	let mut elements: Vec<Element> = project(order, edge).into_iter().collect();
	if let Some(g) = &edge.graph {
		elements.push(value_to_element(g));
	}
	elements.push(value_to_element(&edge.pk));
	Tuple::new(elements)
}

/// Maintains a single graph index under one [`Strategy`].
pub struct GraphIndexMaintainer {
	name: String,
	subspace: Subspace,
	strategy: Strategy,
	stored_fields: Vec<String>,
	state: IndexStateMachine,
}

impl GraphIndexMaintainer {
	pub fn new(name: impl Into<String>, subspace: Subspace, strategy: Strategy, stored_fields: Vec<String>) -> Self {
		Self {
			name: name.into(),
			subspace,
			strategy,
			stored_fields,
			state: IndexStateMachine::disabled(),
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn strategy(&self) -> Strategy {
		self.strategy
	}

	pub fn stored_fields(&self) -> &[String] {
		&self.stored_fields
	}

	pub fn state(&self) -> &IndexStateMachine {
		&self.state
	}

	fn permutation_subspace(&self, perm: &Permutation) -> Subspace {
		self.subspace.child(perm.sub)
	}

	/// All `(key, value)` pairs an edge materializes to, one per
	/// permutation (spec.md §8, P3).
	fn entries(&self, edge: &Edge) -> Vec<(Vec<u8>, Vec<u8>)> {
		let value = crate::codec::pack(&encode_stored_props(&self.stored_fields, &edge.stored_props))
			.unwrap_or_default();
		self.strategy
			.permutations()
			.iter()
			.map(|perm| {
				let key = self.permutation_subspace(perm).pack(&key_tuple(perm.order, edge));
				(key, value.clone())
			})
			.collect()
	}

	/// `updateIndex(oldEdge?, newEdge?, txn)` (spec.md §4.F).
	///
	/// When both images are present and produce identical key/value sets,
	/// no KV I/O occurs (spec.md §4.F: "When both are present and equal, no
	/// KV I/O occurs").
	pub async fn update_index<T: Transaction>(
		&self,
		old: Option<&Edge>,
		new: Option<&Edge>,
		txn: &mut T,
	) -> Result<(), Error> {
		self.state.require_writable(&self.name)?;
		trace!(target: TARGET, index = %self.name, ?old, ?new, "update_index");

		let old_entries: BTreeMap<Vec<u8>, Vec<u8>> = old.map(|e| self.entries(e)).unwrap_or_default().into_iter().collect();
		let new_entries: BTreeMap<Vec<u8>, Vec<u8>> = new.map(|e| self.entries(e)).unwrap_or_default().into_iter().collect();

		if old_entries == new_entries {
			debug!(target: TARGET, index = %self.name, "update_index: old and new images produced equal key sets, skipping I/O");
			return Ok(());
		}

		for (key, _) in old_entries.iter() {
			if !new_entries.contains_key(key) {
				txn.del(key.clone()).await?;
			}
		}
		for (key, val) in new_entries.iter() {
			if old_entries.get(key) != Some(val) {
				txn.set(key.clone(), val.clone()).await?;
			}
		}
		debug!(target: TARGET, index = %self.name, deleted = old_entries.len(), written = new_entries.len(), "update_index: diff applied");
		Ok(())
	}

	/// `scanItem(record, pk, txn)`: an unconditional write, used by
	/// backfill (spec.md §4.F).
	pub async fn scan_item<T: Transaction>(&self, edge: &Edge, txn: &mut T) -> Result<(), Error> {
		self.state.require_writable(&self.name)?;
		trace!(target: TARGET, index = %self.name, ?edge, "scan_item");
		for (key, val) in self.entries(edge) {
			txn.set(key, val).await?;
		}
		Ok(())
	}

	/// Picks the permutation whose prefix is the longest bound prefix of
	/// `(from, predicate, to)`. Ties break lexicographically on
	/// permutation name; adjacency is constrained to `out` when `from` is
	/// bound and `in` when `to` is bound, `out` when both are bound
	/// (spec.md §4.F: "Scan selection").
	fn select_permutation(&self, from: bool, predicate: bool, to: bool) -> &'static Permutation {
		if self.strategy == Strategy::Adjacency {
			return if from {
				&ADJACENCY_OUT
			} else if to {
				&ADJACENCY_IN
			} else {
				&ADJACENCY_OUT
			};
		}
		let bound = |c: Component| match c {
			Component::S => from,
			Component::P => predicate,
			Component::O => to,
		};
		let bound_prefix_len = |perm: &Permutation| {
			perm.order.iter().take_while(|c| bound(**c)).count()
		};
		self.strategy
			.permutations()
			.iter()
			.max_by(|a, b| {
				bound_prefix_len(a)
					.cmp(&bound_prefix_len(b))
					.then_with(|| b.name.cmp(a.name))
			})
			.expect("strategy always has at least one permutation")
	}

	/// `scanEdges(from?, edge?, to?, graph?, filters, txn)` (spec.md §4.F).
	///
	/// Returns a lazily-driven [`scanner::EdgeScan`]; the caller pulls
	/// results with [`scanner::EdgeScan::next`], which only issues KV
	/// scans as the buffer is exhausted (spec.md §5).
	pub fn scan_edges(
		&self,
		from: Option<Value>,
		predicate: Option<Value>,
		to: Option<Value>,
		graph: Option<Value>,
	) -> Result<scanner::EdgeScan, Error> {
		self.state.require_readable(&self.name)?;
		let perm = self.select_permutation(from.is_some(), predicate.is_some(), to.is_some());
		trace!(target: TARGET, index = %self.name, permutation = perm.name, "scan_edges: selected permutation");
		if from.is_none() && predicate.is_none() && to.is_none() {
			warn!(target: TARGET, index = %self.name, "scan_edges: no bound component, full index scan");
		}
		let mut prefix_elements = Vec::new();
		let bound_for = |c: Component| match c {
			Component::S => from.clone(),
			Component::P => predicate.clone(),
			Component::O => to.clone(),
		};
		for c in perm.order {
			match bound_for(c) {
				Some(v) => prefix_elements.push(value_to_element(&v)),
				None => break,
			}
		}
		let prefix = Tuple::new(prefix_elements.clone());
		let sub = self.permutation_subspace(perm);
		let (begin, end) = if prefix_elements.is_empty() {
			sub.range()
		} else {
			sub.range_for(&prefix)
		};
		Ok(scanner::EdgeScan::new(
			begin,
			end,
			sub.as_bytes().len(),
			perm.order,
			graph.is_some(),
			self.stored_fields.clone(),
		))
	}

	/// `unpack` one KV pair produced by this maintainer's permutation
	/// layout back into an [`Edge`]. Exposed for the property-path
	/// executor, which needs to reconstruct edges from a raw scan.
	pub(crate) fn decode_entry(order: [Component; 3], has_graph: bool, key_tail: &Tuple, value: &[u8], stored_fields: &[String]) -> Result<Edge, Error> {
		let mut it = key_tail.0.iter();
		let mut comps = [Value::Null, Value::Null, Value::Null];
		for slot in comps.iter_mut() {
			*slot = element_to_value(it.next().ok_or_else(|| Error::codec("short graph key"))?);
		}
		let graph = if has_graph {
			Some(element_to_value(it.next().ok_or_else(|| Error::codec("missing graph element"))?))
		} else {
			None
		};
		let pk = element_to_value(it.next().ok_or_else(|| Error::codec("missing pk element"))?);

		let mut from = Value::Null;
		let mut predicate = Value::Null;
		let mut to = Value::Null;
		for (component, value) in order.into_iter().zip(comps) {
			match component {
				Component::S => from = value,
				Component::P => predicate = value,
				Component::O => to = value,
			}
		}

		let props = decode_stored_props(stored_fields, value)?;
		let stored_props = if props.is_empty() {
			None
		} else {
			Some(props.into_iter().map(|(k, v)| (k, Some(v))).collect())
		};

		Ok(Edge { from, predicate, to, graph, pk, stored_props })
	}
}

// Re-exported so `scanner`/`path` can decode without depending on
// `Component`'s visibility.
pub(crate) use Component as GraphComponent;
