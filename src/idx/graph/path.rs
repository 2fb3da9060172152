//! Property-path AST, normalization, cost estimation, and evaluation
//! (spec.md §4.H).
//!
//! Evaluation keeps each reached node tagged with the origin it was reached
//! from, even inside `zeroOrMore`/`oneOrMore`'s transitive closure — two
//! different origins that both reach the same node are two separate result
//! pairs, not one. This is the "origin-preserving BFS" contract spec.md
//! calls out as the subtlest part of this module: a naive transitive-closure
//! implementation that dedups purely on the reached node (dropping which
//! origin got there) silently merges results from a multi-origin query.
use std::collections::HashSet;

use async_recursion::async_recursion;

use crate::err::Error;
use crate::idx::graph::GraphIndexMaintainer;
use crate::kvs::Transaction;
use crate::value::{HashableValue, Value};

/// One member of a [`Path::NegatedPropertySet`]: a predicate IRI, optionally
/// traversed in the inverse direction.
#[derive(Debug, Clone, PartialEq)]
pub struct NegatedMember {
	pub iri: Value,
	pub inverse: bool,
}

/// A SPARQL-style property path expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Path {
	Iri(Value),
	Inverse(Box<Path>),
	Sequence(Vec<Path>),
	Alternative(Vec<Path>),
	ZeroOrOne(Box<Path>),
	ZeroOrMore(Box<Path>),
	OneOrMore(Box<Path>),
	NegatedPropertySet(Vec<NegatedMember>),
}

impl Path {
	/// Rewrites this path to a canonical form: inverse pushed down to
	/// leaves, `Sequence`/`Alternative` flattened to right-associated,
	/// single-level lists. Idempotent: `p.normalize().normalize() ==
	/// p.normalize()` (spec.md §4.H, P8).
	pub fn normalize(&self) -> Path {
		match self {
			Path::Iri(_) => self.clone(),
			Path::Inverse(inner) => push_inverse(inner),
			Path::Sequence(parts) => {
				let mut flat = Vec::new();
				for p in parts {
					match p.normalize() {
						Path::Sequence(inner) => flat.extend(inner),
						other => flat.push(other),
					}
				}
				if flat.len() == 1 {
					flat.into_iter().next().unwrap()
				} else {
					Path::Sequence(flat)
				}
			}
			Path::Alternative(parts) => {
				let mut flat = Vec::new();
				for p in parts {
					match p.normalize() {
						Path::Alternative(inner) => flat.extend(inner),
						other => flat.push(other),
					}
				}
				if flat.len() == 1 {
					flat.into_iter().next().unwrap()
				} else {
					Path::Alternative(flat)
				}
			}
			Path::ZeroOrOne(inner) => Path::ZeroOrOne(Box::new(inner.normalize())),
			Path::ZeroOrMore(inner) => Path::ZeroOrMore(Box::new(inner.normalize())),
			Path::OneOrMore(inner) => Path::OneOrMore(Box::new(inner.normalize())),
			Path::NegatedPropertySet(members) => Path::NegatedPropertySet(members.clone()),
		}
	}

	/// A monotone complexity estimate used by the query planner to prefer
	/// cheaper equivalent rewrites (spec.md §4.H: "cost model"). Bounded
	/// closures (`zeroOrMore`/`oneOrMore`) are penalized heavily since their
	/// cost is not statically bounded by the path shape alone.
	pub fn cost(&self) -> u64 {
		const UNBOUNDED_PENALTY: u64 = 1000;
		match self {
			Path::Iri(_) => 1,
			Path::Inverse(inner) => inner.cost(),
			Path::Sequence(parts) => parts.iter().map(Path::cost).sum(),
			Path::Alternative(parts) => parts.iter().map(Path::cost).sum::<u64>().max(1),
			Path::ZeroOrOne(inner) => inner.cost() + 1,
			Path::ZeroOrMore(inner) => inner.cost().saturating_mul(UNBOUNDED_PENALTY),
			Path::OneOrMore(inner) => inner.cost().saturating_mul(UNBOUNDED_PENALTY),
			Path::NegatedPropertySet(members) => members.len().max(1) as u64,
		}
	}
}

/// Pushes an `Inverse` wrapper down through `inner`, recursing until it
/// lands on a leaf (`Iri`/`NegatedPropertySet`), per the standard SPARQL
/// property-path identities:
/// `inv(inv(p)) = p`, `inv(p/q) = inv(q)/inv(p)`, `inv(p|q) = inv(p)|inv(q)`,
/// `inv(p?) = inv(p)?`, `inv(p*) = inv(p)*`, `inv(p+) = inv(p)+`.
fn push_inverse(inner: &Path) -> Path {
	match inner {
		Path::Iri(iri) => Path::Inverse(Box::new(Path::Iri(iri.clone()))),
		Path::Inverse(grand) => grand.normalize(),
		Path::Sequence(parts) => {
			let reversed: Vec<Path> = parts.iter().rev().map(|p| Path::Inverse(Box::new(p.clone())).normalize()).collect();
			Path::Sequence(reversed).normalize()
		}
		Path::Alternative(parts) => {
			Path::Alternative(parts.iter().map(|p| Path::Inverse(Box::new(p.clone())).normalize()).collect()).normalize()
		}
		Path::ZeroOrOne(p) => Path::ZeroOrOne(Box::new(Path::Inverse(Box::new((**p).clone())).normalize())),
		Path::ZeroOrMore(p) => Path::ZeroOrMore(Box::new(Path::Inverse(Box::new((**p).clone())).normalize())),
		Path::OneOrMore(p) => Path::OneOrMore(Box::new(Path::Inverse(Box::new((**p).clone())).normalize())),
		Path::NegatedPropertySet(members) => Path::NegatedPropertySet(
			members.iter().map(|m| NegatedMember { iri: m.iri.clone(), inverse: !m.inverse }).collect(),
		),
	}
}

/// Upper bound on transitive-closure depth for an unconstrained
/// `zeroOrMore`/`oneOrMore` traversal (spec.md §4.H: "a configurable
/// constant (default 10)"). Exceeding it truncates the traversal silently
/// rather than failing — a partial answer, not an error.
const DEFAULT_MAX_DEPTH: usize = 10;

type Pair = (Value, Value);

fn dedup(pairs: Vec<Pair>) -> Vec<Pair> {
	let mut seen = HashSet::new();
	let mut out = Vec::new();
	for (origin, node) in pairs {
		let key = (HashableValue(origin.clone()), HashableValue(node.clone()));
		if seen.insert(key) {
			out.push((origin, node));
		}
	}
	out
}

async fn step_leaf<T: Transaction>(
	iri: &Value,
	inverse: bool,
	frontier: &[Pair],
	maintainer: &GraphIndexMaintainer,
	txn: &mut T,
) -> Result<Vec<Pair>, Error> {
	let mut out = Vec::new();
	for (origin, node) in frontier {
		let mut scan = if inverse {
			maintainer.scan_edges(None, Some(iri.clone()), Some(node.clone()), None)?
		} else {
			maintainer.scan_edges(Some(node.clone()), Some(iri.clone()), None, None)?
		};
		while let Some(edge) = scan.next(txn).await? {
			let next = if inverse { edge.from } else { edge.to };
			out.push((origin.clone(), next));
		}
	}
	Ok(dedup(out))
}

async fn step_negated<T: Transaction>(
	members: &[NegatedMember],
	frontier: &[Pair],
	maintainer: &GraphIndexMaintainer,
	txn: &mut T,
) -> Result<Vec<Pair>, Error> {
	let forward_excluded: Vec<&Value> = members.iter().filter(|m| !m.inverse).map(|m| &m.iri).collect();
	let inverse_excluded: Vec<&Value> = members.iter().filter(|m| m.inverse).map(|m| &m.iri).collect();
	let mut out = Vec::new();
	for (origin, node) in frontier {
		let mut fwd = maintainer.scan_edges(Some(node.clone()), None, None, None)?;
		while let Some(edge) = fwd.next(txn).await? {
			if !forward_excluded.contains(&&edge.predicate) {
				out.push((origin.clone(), edge.to));
			}
		}
		let mut bwd = maintainer.scan_edges(None, None, Some(node.clone()), None)?;
		while let Some(edge) = bwd.next(txn).await? {
			if !inverse_excluded.contains(&&edge.predicate) {
				out.push((origin.clone(), edge.from));
			}
		}
	}
	Ok(dedup(out))
}

/// Applies one transitive-closure step of `inner` to `frontier`, folding
/// newly-discovered `(origin, node)` pairs into `visited` so that a single
/// origin never revisits a node it has already reached (preventing infinite
/// expansion on cyclic graphs) while leaving other origins free to discover
/// that same node independently.
#[async_recursion]
async fn closure<T: Transaction>(
	inner: &Path,
	mut frontier: Vec<Pair>,
	include_zero_length: bool,
	maintainer: &GraphIndexMaintainer,
	txn: &mut T,
) -> Result<Vec<Pair>, Error> {
	let mut visited: HashSet<(HashableValue, HashableValue)> = frontier
		.iter()
		.map(|(o, n)| (HashableValue(o.clone()), HashableValue(n.clone())))
		.collect();
	let mut result = if include_zero_length { frontier.clone() } else { Vec::new() };

	for _depth in 0..DEFAULT_MAX_DEPTH {
		let next = eval(inner, &frontier, maintainer, txn).await?;
		let fresh: Vec<Pair> = next
			.into_iter()
			.filter(|(o, n)| visited.insert((HashableValue(o.clone()), HashableValue(n.clone()))))
			.collect();
		if fresh.is_empty() {
			break;
		}
		result.extend(fresh.iter().cloned());
		frontier = fresh;
	}
	Ok(dedup(result))
}

/// Evaluates `path` against `frontier`, a set of `(origin, currentNode)`
/// pairs, returning the set of `(origin, reachedNode)` pairs after applying
/// `path` to each current node.
#[async_recursion]
pub async fn eval<T: Transaction>(
	path: &Path,
	frontier: &[Pair],
	maintainer: &GraphIndexMaintainer,
	txn: &mut T,
) -> Result<Vec<Pair>, Error> {
	match path {
		Path::Iri(iri) => step_leaf(iri, false, frontier, maintainer, txn).await,
		Path::Inverse(inner) => match inner.as_ref() {
			Path::Iri(iri) => step_leaf(iri, true, frontier, maintainer, txn).await,
			Path::NegatedPropertySet(members) => {
				let flipped: Vec<NegatedMember> =
					members.iter().map(|m| NegatedMember { iri: m.iri.clone(), inverse: !m.inverse }).collect();
				step_negated(&flipped, frontier, maintainer, txn).await
			}
			other => eval(&push_inverse(other), frontier, maintainer, txn).await,
		},
		Path::Sequence(parts) => {
			let mut current = frontier.to_vec();
			for part in parts {
				current = eval(part, &current, maintainer, txn).await?;
			}
			Ok(current)
		}
		Path::Alternative(parts) => {
			let mut out = Vec::new();
			for part in parts {
				out.extend(eval(part, frontier, maintainer, txn).await?);
			}
			Ok(dedup(out))
		}
		Path::ZeroOrOne(inner) => {
			let mut out = frontier.to_vec();
			out.extend(eval(inner, frontier, maintainer, txn).await?);
			Ok(dedup(out))
		}
		Path::ZeroOrMore(inner) => closure(inner, frontier.to_vec(), true, maintainer, txn).await,
		Path::OneOrMore(inner) => closure(inner, frontier.to_vec(), false, maintainer, txn).await,
		Path::NegatedPropertySet(members) => step_negated(members, frontier, maintainer, txn).await,
	}
}

/// Entry point: evaluates `path` starting from each of `origins`, each
/// paired with itself as the zero-length frontier.
pub async fn evaluate<T: Transaction>(
	path: &Path,
	origins: &[Value],
	maintainer: &GraphIndexMaintainer,
	txn: &mut T,
) -> Result<Vec<Pair>, Error> {
	let frontier: Vec<Pair> = origins.iter().map(|o| (o.clone(), o.clone())).collect();
	eval(&path.normalize(), &frontier, maintainer, txn).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::idx::graph::Strategy;
	use crate::kvs::{Datastore, MemoryDatastore};
	use crate::subspace::Directory;

	fn edge(from: &str, pred: &str, to: &str) -> crate::idx::graph::Edge {
		crate::idx::graph::Edge {
			from: Value::from(from),
			predicate: Value::from(pred),
			to: Value::from(to),
			graph: None,
			pk: Value::from(format!("{from}-{pred}-{to}")),
			stored_props: None,
		}
	}

	fn maintainer() -> GraphIndexMaintainer {
		let dir = Directory::new();
		let m = GraphIndexMaintainer::new("knows", dir.resolve(&["edges"]), Strategy::Hexastore, vec![]);
		m.state().enable().unwrap();
		m.state().make_readable().unwrap();
		m
	}

	#[test]
	fn double_inverse_cancels() {
		let p = Path::Inverse(Box::new(Path::Inverse(Box::new(Path::Iri(Value::from("knows"))))));
		assert_eq!(p.normalize(), Path::Iri(Value::from("knows")));
	}

	#[test]
	fn inverse_of_sequence_reverses_and_distributes() {
		let p = Path::Inverse(Box::new(Path::Sequence(vec![
			Path::Iri(Value::from("a")),
			Path::Iri(Value::from("b")),
		])));
		let got = p.normalize();
		let expected = Path::Sequence(vec![
			Path::Inverse(Box::new(Path::Iri(Value::from("b")))),
			Path::Inverse(Box::new(Path::Iri(Value::from("a")))),
		]);
		assert_eq!(got, expected);
	}

	#[test]
	fn normalize_is_idempotent() {
		let p = Path::Alternative(vec![
			Path::Alternative(vec![Path::Iri(Value::from("a")), Path::Iri(Value::from("b"))]),
			Path::Iri(Value::from("c")),
		]);
		let once = p.normalize();
		let twice = once.normalize();
		assert_eq!(once, twice);
	}

	#[test]
	fn zero_or_more_cost_dwarfs_bounded_paths() {
		let bounded = Path::Sequence(vec![Path::Iri(Value::from("a")), Path::Iri(Value::from("b"))]);
		let unbounded = Path::ZeroOrMore(Box::new(Path::Iri(Value::from("a"))));
		assert!(unbounded.cost() > bounded.cost() * 100);
	}

	#[tokio::test]
	async fn zero_or_more_preserves_distinct_origins_through_shared_node() {
		// A -knows-> C, B -knows-> C: a zeroOrMore closure from {A, B} must
		// report C reached from both A and B, not collapse to one pair.
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some(&edge("A", "knows", "C")), &mut tx).await.unwrap();
		m.update_index(None, Some(&edge("B", "knows", "C")), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let path = Path::ZeroOrMore(Box::new(Path::Iri(Value::from("knows"))));
		let got = evaluate(&path, &[Value::from("A"), Value::from("B")], &m, &mut tx).await.unwrap();

		assert!(got.contains(&(Value::from("A"), Value::from("C"))));
		assert!(got.contains(&(Value::from("B"), Value::from("C"))));
	}

	#[tokio::test]
	async fn one_or_more_excludes_zero_length_reflexive_pair() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some(&edge("A", "knows", "B")), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let path = Path::OneOrMore(Box::new(Path::Iri(Value::from("knows"))));
		let got = evaluate(&path, &[Value::from("A")], &m, &mut tx).await.unwrap();
		assert_eq!(got, vec![(Value::from("A"), Value::from("B"))]);
	}

	#[tokio::test]
	async fn transitive_closure_terminates_on_cycle() {
		let m = maintainer();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some(&edge("A", "knows", "B")), &mut tx).await.unwrap();
		m.update_index(None, Some(&edge("B", "knows", "A")), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let path = Path::ZeroOrMore(Box::new(Path::Iri(Value::from("knows"))));
		let got = evaluate(&path, &[Value::from("A")], &m, &mut tx).await.unwrap();
		assert_eq!(got.len(), 2, "A->A (zero length) and A->B, cycle must not loop forever");
	}
}
