//! The SHOIN(D) tableau decision procedure (spec.md §4.K).
//!
//! The completion graph is an arena (`Vec<Node>`) addressed by stable
//! integer indices, per spec.md §9's "ownership of the ontology in the
//! reasoner" design note — merges and blocking lookups never need to walk a
//! pointer graph, only index into the arena. Non-deterministic rules
//! (`⊔`, max-cardinality merge) are resolved by cloning the graph per
//! alternative and recursing rather than an explicit undo log: completion
//! graphs at the scale this reference engine targets are small, and a
//! full snapshot/truncate undo buys nothing a clone doesn't already give
//! for free. `RegularityViolation`/`ExpansionLimitExceeded` are the two
//! non-satisfiability outcomes this module can report as `unknown`.
use std::collections::{BTreeMap, BTreeSet};

use crate::err::Error;
use crate::reasoner::ontology::{ClassExpr, Ontology, RoleExpr};

const TARGET: &str = "recordgraph_core::reasoner::tableau";

/// `{maxExpansionSteps, checkRegularity, abortOnRegularityViolations,
/// cacheClassification}` (spec.md §9).
#[derive(Debug, Clone, Copy)]
pub struct ReasonerConfig {
	pub max_expansion_steps: u64,
	pub check_regularity: bool,
	pub abort_on_regularity_violations: bool,
	pub cache_classification: bool,
}

impl Default for ReasonerConfig {
	fn default() -> Self {
		Self {
			max_expansion_steps: 5_000,
			check_regularity: true,
			abort_on_regularity_violations: true,
			cache_classification: true,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfiability {
	Satisfiable,
	Unsatisfiable,
	Unknown,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Stats {
	pub expansion_steps: u64,
	pub nodes_created: u64,
	pub backtracks: u64,
}

#[derive(Clone, Debug, Default)]
struct Node {
	label: BTreeSet<ClassExpr>,
	individual: Option<String>,
	parent: Option<usize>,
	edges_out: Vec<(RoleExpr, usize)>,
	edges_in: Vec<(RoleExpr, usize)>,
	distinct_from: BTreeSet<usize>,
	merged: bool,
}

#[derive(Clone, Debug, Default)]
struct CompletionGraph {
	nodes: Vec<Node>,
}

impl CompletionGraph {
	fn add_node(&mut self, label: BTreeSet<ClassExpr>, parent: Option<usize>) -> usize {
		self.nodes.push(Node { label, parent, ..Default::default() });
		self.nodes.len() - 1
	}

	/// `true` if `expr` was not already present.
	fn add_to_label(&mut self, node: usize, expr: ClassExpr) -> bool {
		self.nodes[node].insert_label(expr)
	}

	fn is_sub_role(&self, ontology: &Ontology, from: &RoleExpr, target: &RoleExpr) -> bool {
		if from == target {
			return true;
		}
		let mut frontier = ontology.direct_super_roles(from);
		let mut seen = BTreeSet::new();
		while let Some(r) = frontier.pop() {
			if &r == target {
				return true;
			}
			if seen.insert(r.clone()) {
				frontier.extend(ontology.direct_super_roles(&r));
			}
		}
		false
	}

	fn add_edge(&mut self, ontology: &Ontology, from: usize, role: RoleExpr, to: usize) {
		self.nodes[from].edges_out.push((role.clone(), to));
		self.nodes[to].edges_in.push((role.clone(), from));
		if ontology.characteristics(&role).symmetric {
			self.nodes[to].edges_out.push((role.clone(), from));
			self.nodes[from].edges_in.push((role, to));
		}
	}

	fn successors_via(&self, ontology: &Ontology, node: usize, role: &RoleExpr) -> Vec<usize> {
		match role {
			RoleExpr::Inverse(inner) => self.nodes[node]
				.edges_in
				.iter()
				.filter(|(r, _)| self.is_sub_role(ontology, r, inner))
				.map(|(_, from)| *from)
				.collect(),
			other => self.nodes[node]
				.edges_out
				.iter()
				.filter(|(r, _)| self.is_sub_role(ontology, r, other))
				.map(|(_, to)| *to)
				.collect(),
		}
	}

	fn add_successor(&mut self, ontology: &Ontology, parent: usize, role: RoleExpr, seed: BTreeSet<ClassExpr>) -> usize {
		let to = self.add_node(seed, Some(parent));
		self.add_edge(ontology, parent, role, to);
		to
	}

	/// Ancestors of `node` walking tree-edge parent pointers, nearest
	/// first.
	fn ancestors(&self, node: usize) -> Vec<usize> {
		let mut out = Vec::new();
		let mut cur = self.nodes[node].parent;
		while let Some(a) = cur {
			out.push(a);
			cur = self.nodes[a].parent;
		}
		out
	}

	/// Subset blocking (spec.md §4.K): `y` is blocked when some ancestor
	/// `x`'s label is a superset of `y`'s.
	fn is_blocked(&self, node: usize) -> bool {
		let label = &self.nodes[node].label;
		self.ancestors(node).iter().any(|&a| label.is_subset(&self.nodes[a].label))
	}

	fn active_nodes(&self) -> Vec<usize> {
		(0..self.nodes.len()).filter(|&i| !self.nodes[i].merged && !self.is_blocked(i)).collect()
	}

	/// A clash, if any active node's label is contradictory, or a
	/// functional/irreflexive role constraint is violated.
	fn find_clash(&self, ontology: &Ontology) -> Option<String> {
		for i in self.active_nodes() {
			let label = &self.nodes[i].label;
			if label.contains(&ClassExpr::Bottom) {
				return Some(format!("node {i}: Bottom in label"));
			}
			for expr in label {
				if let ClassExpr::Not(name) = expr {
					if label.contains(&ClassExpr::Named(name.clone())) {
						return Some(format!("node {i}: clash on {{{name}, ¬{name}}}"));
					}
				}
			}
			// Functional / inverse-functional roles: two provably distinct
			// R-successors is a clash (a merge would have been attempted
			// first; by the time we check for clash, no more merges are
			// pending).
			let mut by_role: std::collections::BTreeMap<&RoleExpr, Vec<usize>> = Default::default();
			for (r, to) in &self.nodes[i].edges_out {
				by_role.entry(r).or_default().push(*to);
			}
			for (role, tos) in by_role {
				if ontology.characteristics(role).functional && tos.len() > 1 {
					for a in 0..tos.len() {
						for b in (a + 1)..tos.len() {
							if self.nodes[tos[a]].distinct_from.contains(&tos[b]) {
								return Some(format!("node {i}: functional role {role:?} has distinct successors"));
							}
						}
					}
				}
				if ontology.characteristics(role).irreflexive && tos.contains(&i) {
					return Some(format!("node {i}: irreflexive role {role:?} has a self-loop"));
				}
			}
		}
		None
	}

	/// Merges `b` into `a`: redirects every edge touching `b` onto `a`,
	/// unions labels, tombstones `b`. Fails (leaving the graph untouched)
	/// if `a`/`b` were previously marked pairwise-distinct.
	fn merge(&mut self, a: usize, b: usize) -> Result<(), ()> {
		if self.nodes[a].distinct_from.contains(&b) {
			return Err(());
		}
		let b_label = self.nodes[b].label.clone();
		let b_out = self.nodes[b].edges_out.clone();
		let b_in = self.nodes[b].edges_in.clone();
		for e in b_label {
			self.nodes[a].insert_label(e);
		}
		for (r, to) in b_out {
			let to = if to == b { a } else { to };
			self.nodes[a].edges_out.push((r, to));
		}
		for (r, from) in b_in {
			let from = if from == b { a } else { from };
			self.nodes[a].edges_in.push((r, from));
		}
		self.nodes[b].merged = true;
		Ok(())
	}
}

impl Node {
	fn insert_label(&mut self, expr: ClassExpr) -> bool {
		self.label.insert(expr)
	}
}

fn gci_applies(lhs: &ClassExpr, label: &BTreeSet<ClassExpr>) -> bool {
	match lhs {
		ClassExpr::Top => true,
		ClassExpr::And(parts) => parts.iter().all(|p| label.contains(p)),
		other => label.contains(other),
	}
}

fn collect_cardinality_roles(expr: &ClassExpr, out: &mut Vec<RoleExpr>) {
	match expr {
		ClassExpr::MinCard(_, role, inner) | ClassExpr::MaxCard(_, role, inner) => {
			out.push(role.clone());
			collect_cardinality_roles(inner, out);
		}
		ClassExpr::Some(_, inner) | ClassExpr::All(_, inner) => collect_cardinality_roles(inner, out),
		ClassExpr::And(parts) | ClassExpr::Or(parts) => parts.iter().for_each(|p| collect_cardinality_roles(p, out)),
		_ => {}
	}
}

/// Checks every cardinality restriction reachable from `probe` or the
/// TBox against non-simple roles (spec.md §4.K: "a transitive or
/// non-simple role occurring in a cardinality restriction").
fn regularity_violations(ontology: &Ontology, probe: &ClassExpr) -> Vec<String> {
	let mut roles = Vec::new();
	collect_cardinality_roles(probe, &mut roles);
	for (lhs, rhs) in &ontology.tbox {
		collect_cardinality_roles(lhs, &mut roles);
		collect_cardinality_roles(rhs, &mut roles);
	}
	roles
		.into_iter()
		.filter(|r| ontology.is_non_simple(r))
		.map(|r| format!("non-simple role {r:?} used in a cardinality restriction"))
		.collect()
}

enum Outcome {
	Open,
	Clash,
	LimitExceeded,
}

fn saturate_deterministic(graph: &mut CompletionGraph, ontology: &Ontology, stats: &mut Stats, config: &ReasonerConfig) -> Outcome {
	loop {
		if let Some(_reason) = graph.find_clash(ontology) {
			return Outcome::Clash;
		}
		let mut changed = false;
		for idx in graph.active_nodes() {
			stats.expansion_steps += 1;
			if stats.expansion_steps > config.max_expansion_steps {
				return Outcome::LimitExceeded;
			}

			for (lhs, rhs) in &ontology.tbox {
				if gci_applies(lhs, &graph.nodes[idx].label) && graph.add_to_label(idx, rhs.clone()) {
					changed = true;
				}
			}
			for (role, cls) in &ontology.domain {
				if !graph.nodes[idx].edges_out.iter().any(|(r, _)| r == role) {
					continue;
				}
				if graph.add_to_label(idx, cls.clone()) {
					changed = true;
				}
			}
			for (role, cls) in &ontology.range {
				for (r, to) in graph.nodes[idx].edges_out.clone() {
					if &r == role && graph.add_to_label(to, cls.clone()) {
						changed = true;
					}
				}
			}

			let snapshot: Vec<ClassExpr> = graph.nodes[idx].label.iter().cloned().collect();
			for expr in snapshot {
				match expr {
					ClassExpr::And(parts) => {
						for p in parts {
							if graph.add_to_label(idx, p) {
								changed = true;
							}
						}
					}
					ClassExpr::All(role, inner) => {
						let transitive = ontology.characteristics(&role).transitive;
						for to in graph.successors_via(ontology, idx, &role) {
							if graph.add_to_label(to, (*inner).clone()) {
								changed = true;
							}
							if transitive && graph.add_to_label(to, ClassExpr::All(role.clone(), inner.clone())) {
								changed = true;
							}
						}
					}
					ClassExpr::HasValue(role, individual) => {
						let exists = graph
							.successors_via(ontology, idx, &role)
							.iter()
							.any(|&to| graph.nodes[to].individual.as_deref() == Some(individual.as_str()));
						if !exists {
							let to = graph.add_successor(ontology, idx, role, BTreeSet::new());
							graph.nodes[to].individual = Some(individual);
							stats.nodes_created += 1;
							changed = true;
						}
					}
					ClassExpr::HasSelf(role) => {
						let exists = graph.successors_via(ontology, idx, &role).contains(&idx);
						if !exists {
							graph.add_edge(ontology, idx, role, idx);
							changed = true;
						}
					}
					ClassExpr::Some(role, inner) => {
						let exists = graph.successors_via(ontology, idx, &role).iter().any(|&to| graph.nodes[to].label.contains(&inner));
						if !exists {
							let mut seed = BTreeSet::new();
							seed.insert((*inner).clone());
							graph.add_successor(ontology, idx, role, seed);
							stats.nodes_created += 1;
							changed = true;
						}
					}
					ClassExpr::MinCard(n, role, inner) => {
						let existing: Vec<usize> =
							graph.successors_via(ontology, idx, &role).into_iter().filter(|&to| graph.nodes[to].label.contains(&inner)).collect();
						if existing.len() < n as usize {
							let mut fresh = Vec::new();
							for _ in existing.len()..(n as usize) {
								let mut seed = BTreeSet::new();
								seed.insert((*inner).clone());
								let to = graph.add_successor(ontology, idx, role.clone(), seed);
								stats.nodes_created += 1;
								fresh.push(to);
							}
							let all: Vec<usize> = existing.iter().chain(fresh.iter()).copied().collect();
							for &a in &all {
								for &b in &all {
									if a != b {
										graph.nodes[a].distinct_from.insert(b);
									}
								}
							}
							changed = true;
						}
					}
					_ => {}
				}
			}
		}
		if apply_nominal_rule(graph) {
			changed = true;
		}
		if !changed {
			return Outcome::Open;
		}
	}
}

/// Binds a node whose label asserts a singleton nominal `{a}` to
/// individual `a`, and merges any two active nodes bound to the same
/// name, since a nominal denotes exactly one individual (spec.md §4.K,
/// the "O" in SHOIN(D)).
fn apply_nominal_rule(graph: &mut CompletionGraph) -> bool {
	let mut by_name: BTreeMap<String, usize> = BTreeMap::new();
	let mut changed = false;
	for idx in graph.active_nodes() {
		let singleton = graph.nodes[idx].label.iter().find_map(|e| match e {
			ClassExpr::OneOf(names) if names.len() == 1 => Some(names[0].clone()),
			_ => None,
		});
		let Some(name) = singleton.or_else(|| graph.nodes[idx].individual.clone()) else {
			continue;
		};
		if graph.nodes[idx].individual.is_none() {
			graph.nodes[idx].individual = Some(name.clone());
			changed = true;
		}
		match by_name.get(&name) {
			None => {
				by_name.insert(name, idx);
			}
			Some(&other) if other != idx => {
				trace!(target: TARGET, a = other, b = idx, nominal = %name, "apply_nominal_rule: merging nodes sharing a nominal");
				if graph.merge(other, idx).is_err() {
					graph.add_to_label(other, ClassExpr::Bottom);
				}
				changed = true;
			}
			_ => {}
		}
	}
	changed
}

/// Finds the first `⊔` in an active node's label that hasn't already had
/// one of its disjuncts asserted.
fn find_disjunction(graph: &CompletionGraph) -> Option<(usize, Vec<ClassExpr>)> {
	for idx in graph.active_nodes() {
		for expr in &graph.nodes[idx].label {
			if let ClassExpr::Or(parts) = expr {
				if !parts.iter().any(|p| graph.nodes[idx].label.contains(p)) {
					return Some((idx, parts.clone()));
				}
			}
		}
	}
	None
}

/// Finds the first `≤n` restriction whose node currently has more than `n`
/// qualifying successors, returning candidate pairs to merge.
fn find_cardinality_merge(graph: &CompletionGraph, ontology: &Ontology) -> Option<Vec<(usize, usize)>> {
	for idx in graph.active_nodes() {
		for expr in graph.nodes[idx].label.clone() {
			if let ClassExpr::MaxCard(n, role, inner) = expr {
				let qualifying: Vec<usize> =
					graph.successors_via(ontology, idx, &role).into_iter().filter(|&to| graph.nodes[to].label.contains(&inner)).collect();
				if qualifying.len() > n as usize {
					let mut pairs = Vec::new();
					for a in 0..qualifying.len() {
						for b in (a + 1)..qualifying.len() {
							pairs.push((qualifying[a], qualifying[b]));
						}
					}
					return Some(pairs);
				}
			}
		}
	}
	None
}

fn run(mut graph: CompletionGraph, ontology: &Ontology, config: &ReasonerConfig, stats: &mut Stats) -> Outcome {
	loop {
		match saturate_deterministic(&mut graph, ontology, stats, config) {
			Outcome::Clash => return Outcome::Clash,
			Outcome::LimitExceeded => {
				error!(target: TARGET, steps = stats.expansion_steps, "run: exceeded maxExpansionSteps");
				return Outcome::LimitExceeded;
			}
			Outcome::Open => {}
		}

		if let Some((idx, disjuncts)) = find_disjunction(&graph) {
			let mut saw_limit = false;
			for d in disjuncts {
				let mut branch = graph.clone();
				if !branch.add_to_label(idx, d) {
					continue;
				}
				stats.backtracks += 1;
				trace!(target: TARGET, node = idx, disjunct = ?d, "run: backtracking on disjunction");
				match run(branch, ontology, config, stats) {
					Outcome::Open => return Outcome::Open,
					Outcome::Clash => continue,
					Outcome::LimitExceeded => saw_limit = true,
				}
			}
			return if saw_limit { Outcome::LimitExceeded } else { Outcome::Clash };
		}

		if let Some(pairs) = find_cardinality_merge(&graph, ontology) {
			let mut saw_limit = false;
			for (a, b) in pairs {
				let mut branch = graph.clone();
				if branch.merge(a, b).is_err() {
					continue;
				}
				stats.backtracks += 1;
				match run(branch, ontology, config, stats) {
					Outcome::Open => return Outcome::Open,
					Outcome::Clash => continue,
					Outcome::LimitExceeded => saw_limit = true,
				}
			}
			return if saw_limit { Outcome::LimitExceeded } else { Outcome::Clash };
		}

		return Outcome::Open;
	}
}

/// Decides satisfiability of `concept` under `ontology` (spec.md §4.K).
pub fn is_satisfiable(ontology: &Ontology, concept: &ClassExpr, config: &ReasonerConfig) -> Result<(Satisfiability, Stats), Error> {
	let mut stats = Stats::default();
	debug!(target: TARGET, ?concept, "is_satisfiable");

	if config.check_regularity {
		let violations = regularity_violations(ontology, concept);
		if !violations.is_empty() {
			if config.abort_on_regularity_violations {
				warn!(target: TARGET, ?violations, "is_satisfiable: aborting on regularity violation");
				return Ok((Satisfiability::Unknown, stats));
			}
		}
	}

	let mut root_label = BTreeSet::new();
	root_label.insert(concept.clone());
	let mut graph = CompletionGraph::default();
	graph.add_node(root_label, None);
	stats.nodes_created += 1;

	let result = match run(graph, ontology, config, &mut stats) {
		Outcome::Open => Satisfiability::Satisfiable,
		Outcome::Clash => Satisfiability::Unsatisfiable,
		Outcome::LimitExceeded => Satisfiability::Unknown,
	};
	debug!(target: TARGET, ?result, steps = stats.expansion_steps, backtracks = stats.backtracks, "is_satisfiable: done");
	Ok((result, stats))
}

/// Decides `individual : class` under `ontology ∪ ABox` (spec.md §4.K/§4.L):
/// `a : C` holds iff `ontology ∪ ABox ∪ {a : ¬C}` is unsatisfiable. Seeds one
/// node per individual named anywhere in the ABox, asserts every ABox fact
/// onto those nodes, then runs the same saturation loop as
/// [`is_satisfiable`].
///
/// ABox role edges between pre-existing individuals aren't tree edges, so
/// [`CompletionGraph::is_blocked`] (which only walks `parent` pointers) never
/// blocks a seeded node — acceptable for the small, finite ABoxes this
/// reasoner targets.
pub fn abox_satisfiability(
	ontology: &Ontology,
	individual: &str,
	extra: ClassExpr,
	config: &ReasonerConfig,
) -> Result<(Satisfiability, Stats), Error> {
	let mut stats = Stats::default();
	trace!(target: TARGET, individual, ?extra, "abox_satisfiability");

	if config.check_regularity {
		let violations = regularity_violations(ontology, &extra);
		if !violations.is_empty() && config.abort_on_regularity_violations {
			warn!(target: TARGET, ?violations, "abox_satisfiability: aborting on regularity violation");
			return Ok((Satisfiability::Unknown, stats));
		}
	}

	let mut graph = CompletionGraph::default();
	let mut nodes_by_name: BTreeMap<String, usize> = BTreeMap::new();
	let mut names: BTreeSet<String> = BTreeSet::new();
	names.insert(individual.to_string());
	for (a, _) in &ontology.abox_concepts {
		names.insert(a.clone());
	}
	for (a, _, b) in &ontology.abox_roles {
		names.insert(a.clone());
		names.insert(b.clone());
	}
	for name in &names {
		let idx = graph.add_node(BTreeSet::new(), None);
		graph.nodes[idx].individual = Some(name.clone());
		nodes_by_name.insert(name.clone(), idx);
		stats.nodes_created += 1;
	}
	for (a, c) in &ontology.abox_concepts {
		graph.add_to_label(nodes_by_name[a], c.clone());
	}
	for (a, role, b) in &ontology.abox_roles {
		let (from, to) = (nodes_by_name[a], nodes_by_name[b]);
		graph.add_edge(ontology, from, role.clone(), to);
	}
	graph.add_to_label(nodes_by_name[individual], extra);

	let result = match run(graph, ontology, config, &mut stats) {
		Outcome::Open => Satisfiability::Satisfiable,
		Outcome::Clash => Satisfiability::Unsatisfiable,
		Outcome::LimitExceeded => Satisfiability::Unknown,
	};
	debug!(target: TARGET, ?result, individual, "abox_satisfiability: done");
	Ok((result, stats))
}
