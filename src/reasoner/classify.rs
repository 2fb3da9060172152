//! Subsumption and classification built on the satisfiability probe
//! (spec.md §4.L): `C ⊑ D` iff `C ⊓ ¬D` is unsatisfiable.
use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;

use crate::err::Error;
use crate::reasoner::ontology::{ClassExpr, Ontology};
use crate::reasoner::tableau::{abox_satisfiability, is_satisfiable, ReasonerConfig, Satisfiability, Stats};

/// Negates `expr` for use as the right-hand probe in a subsumption check.
/// Only handles the shapes `classify`/`subsumes` ever constructs (named
/// classes and conjunctions of them) — general boolean negation belongs to
/// callers building `ClassExpr` trees themselves.
fn negate(expr: &ClassExpr) -> ClassExpr {
	match expr {
		ClassExpr::Named(n) => ClassExpr::Not(n.clone()),
		ClassExpr::Not(n) => ClassExpr::Named(n.clone()),
		ClassExpr::Top => ClassExpr::Bottom,
		ClassExpr::Bottom => ClassExpr::Top,
		other => ClassExpr::Not(format!("{other:?}")),
	}
}

/// A memoized subsumption/satisfiability oracle over one [`Ontology`]
/// (spec.md §4.L: "classification results may be cached").
pub struct Classifier<'a> {
	ontology: &'a Ontology,
	config: ReasonerConfig,
	cache: DashMap<(ClassExpr, ClassExpr), bool>,
}

impl<'a> Classifier<'a> {
	pub fn new(ontology: &'a Ontology, config: ReasonerConfig) -> Self {
		Self { ontology, config, cache: DashMap::new() }
	}

	pub fn is_satisfiable(&self, concept: &ClassExpr) -> Result<(Satisfiability, Stats), Error> {
		is_satisfiable(self.ontology, concept, &self.config)
	}

	/// `sub ⊑ sup`, i.e. `unsat(sub ⊓ ¬sup)`. Returns `Ok(false)` (not an
	/// error) when the probe comes back `Unknown`, per spec.md §4.L: an
	/// inconclusive probe is treated as "subsumption not established"
	/// rather than propagated as a hard error, so a caller classifying a
	/// whole hierarchy doesn't abort on one expansion-limited concept.
	pub fn subsumes(&mut self, sup: &ClassExpr, sub: &ClassExpr) -> Result<bool, Error> {
		let key = (sub.clone(), sup.clone());
		if self.config.cache_classification {
			if let Some(hit) = self.cache.get(&key) {
				return Ok(*hit);
			}
		}
		let probe = ClassExpr::and([sub.clone(), negate(sup)]);
		let (result, _) = is_satisfiable(self.ontology, &probe, &self.config)?;
		let holds = matches!(result, Satisfiability::Unsatisfiable);
		if self.config.cache_classification {
			self.cache.insert(key, holds);
		}
		Ok(holds)
	}

	pub fn equivalent(&mut self, a: &ClassExpr, b: &ClassExpr) -> Result<bool, Error> {
		Ok(self.subsumes(b, a)? && self.subsumes(a, b)?)
	}

	/// Builds the direct-subsumption hierarchy over `classes`: for each
	/// pair, whether `a ⊑ b` holds, with self-subsumption omitted. This is
	/// the all-pairs probe spec.md §4.L calls "classification"; it does not
	/// attempt to prune to only the *direct* (non-transitively-implied)
	/// edges, since the spec only requires the subsumption relation itself,
	/// not a Hasse diagram.
	pub fn classify(&mut self, classes: &[ClassExpr]) -> Result<BTreeMap<ClassExpr, BTreeSet<ClassExpr>>, Error> {
		let mut edges: BTreeMap<ClassExpr, BTreeSet<ClassExpr>> = BTreeMap::new();
		for a in classes {
			let mut supers = BTreeSet::new();
			for b in classes {
				if a == b {
					continue;
				}
				if self.subsumes(b, a)? {
					supers.insert(b.clone());
				}
			}
			edges.insert(a.clone(), supers);
		}
		Ok(edges)
	}

	/// `a : C`, i.e. `unsat(ontology ∪ ABox ∪ {a : ¬C})` (spec.md §4.K/§4.L).
	pub fn instance_of(&mut self, individual: &str, class: &ClassExpr) -> Result<bool, Error> {
		let (result, _) = abox_satisfiability(self.ontology, individual, negate(class), &self.config)?;
		Ok(matches!(result, Satisfiability::Unsatisfiable))
	}

	/// Every individual named in the ABox for which `instance_of` holds
	/// (spec.md §4.L: an instances-of query enumerating individuals and
	/// testing each).
	pub fn instances_of(&mut self, class: &ClassExpr) -> Result<Vec<String>, Error> {
		let mut names: BTreeSet<String> = BTreeSet::new();
		for (a, _) in &self.ontology.abox_concepts {
			names.insert(a.clone());
		}
		for (a, _, b) in &self.ontology.abox_roles {
			names.insert(a.clone());
			names.insert(b.clone());
		}
		let mut out = Vec::new();
		for name in names {
			if self.instance_of(&name, class)? {
				out.push(name);
			}
		}
		Ok(out)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::reasoner::ontology::ClassExpr::Named;

	fn ontology() -> Ontology {
		let mut onto = Ontology::new();
		onto.subclass(Named("Dog".into()), Named("Mammal".into()));
		onto.subclass(Named("Mammal".into()), Named("Animal".into()));
		onto.disjoint(Named("Animal".into()), Named("Plant".into()));
		onto
	}

	#[test]
	fn transitive_subsumption_holds_scenario_6() {
		let onto = ontology();
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		assert!(clf.subsumes(&Named("Animal".into()), &Named("Dog".into())).unwrap());
		assert!(!clf.subsumes(&Named("Dog".into()), &Named("Animal".into())).unwrap());
	}

	#[test]
	fn disjoint_classes_do_not_subsume() {
		let onto = ontology();
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		assert!(!clf.subsumes(&Named("Plant".into()), &Named("Animal".into())).unwrap());
	}

	#[test]
	fn classify_builds_full_super_class_sets() {
		let onto = ontology();
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		let classes = vec![Named("Dog".into()), Named("Mammal".into()), Named("Animal".into()), Named("Plant".into())];
		let edges = clf.classify(&classes).unwrap();
		let dog_supers = &edges[&Named("Dog".into())];
		assert!(dog_supers.contains(&Named("Mammal".into())));
		assert!(dog_supers.contains(&Named("Animal".into())));
		assert!(!dog_supers.contains(&Named("Plant".into())));
	}

	#[test]
	fn equivalence_is_mutual_subsumption() {
		let onto = ontology();
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		assert!(clf.equivalent(&Named("Dog".into()), &Named("Dog".into())).unwrap());
		assert!(!clf.equivalent(&Named("Dog".into()), &Named("Mammal".into())).unwrap());
	}

	#[test]
	fn subsumption_results_are_cached() {
		let onto = ontology();
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		assert!(clf.subsumes(&Named("Animal".into()), &Named("Dog".into())).unwrap());
		assert_eq!(clf.cache.len(), 1);
		assert!(clf.subsumes(&Named("Animal".into()), &Named("Dog".into())).unwrap());
		assert_eq!(clf.cache.len(), 1);
	}

	#[test]
	fn instance_of_follows_tbox_subsumption() {
		let mut onto = ontology();
		onto.assert_concept("rex", Named("Dog".into()));
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		assert!(clf.instance_of("rex", &Named("Mammal".into())).unwrap());
		assert!(!clf.instance_of("rex", &Named("Plant".into())).unwrap());
	}

	#[test]
	fn instances_of_enumerates_abox_individuals() {
		let mut onto = ontology();
		onto.assert_concept("rex", Named("Dog".into()));
		onto.assert_concept("daisy", Named("Plant".into()));
		let mut clf = Classifier::new(&onto, ReasonerConfig::default());
		let animals = clf.instances_of(&Named("Animal".into())).unwrap();
		assert_eq!(animals, vec!["rex".to_string()]);
	}
}
