//! Ontology value types consumed by the tableau reasoner (spec.md §3, §4.K).
//!
//! Class expressions are expected in negation normal form: `Not` only ever
//! wraps a named class. Callers that hold a general boolean expression push
//! negation to the leaves before handing the ontology to the reasoner — the
//! same precondition real DL reasoners document for their tableau core,
//! keeping the expansion rules in `tableau.rs` from needing a De Morgan
//! rewrite step of their own.
use std::collections::BTreeMap;

/// A named object or data role, optionally inverted.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RoleExpr {
	Named(String),
	Inverse(Box<RoleExpr>),
}

impl RoleExpr {
	pub fn named(name: impl Into<String>) -> Self {
		RoleExpr::Named(name.into())
	}

	pub fn inverse(self) -> Self {
		match self {
			RoleExpr::Inverse(inner) => *inner,
			other => RoleExpr::Inverse(Box::new(other)),
		}
	}

	/// The role name stripped of any inversion, used to look up role
	/// characteristics (which are declared per base role name).
	pub fn base_name(&self) -> &str {
		match self {
			RoleExpr::Named(n) => n,
			RoleExpr::Inverse(inner) => inner.base_name(),
		}
	}

	pub fn is_inverse(&self) -> bool {
		matches!(self, RoleExpr::Inverse(_))
	}
}

/// A class expression in negation normal form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClassExpr {
	Top,
	Bottom,
	Named(String),
	Not(String),
	And(Vec<ClassExpr>),
	Or(Vec<ClassExpr>),
	Some(RoleExpr, Box<ClassExpr>),
	All(RoleExpr, Box<ClassExpr>),
	MinCard(u32, RoleExpr, Box<ClassExpr>),
	MaxCard(u32, RoleExpr, Box<ClassExpr>),
	/// `{a, b, ...}`: a nominal class naming exactly these individuals.
	OneOf(Vec<String>),
	HasSelf(RoleExpr),
	HasValue(RoleExpr, String),
}

impl ClassExpr {
	pub fn and(parts: impl IntoIterator<Item = ClassExpr>) -> Self {
		ClassExpr::And(parts.into_iter().collect())
	}

	pub fn or(parts: impl IntoIterator<Item = ClassExpr>) -> Self {
		ClassExpr::Or(parts.into_iter().collect())
	}

	/// The negation of a named class or `Top`/`Bottom`, already in NNF.
	/// Negating a compound expression requires the caller to push the
	/// negation through first (De Morgan); this only handles the leaves the
	/// tableau actually clashes on.
	pub fn negate_named(name: impl Into<String>) -> Self {
		ClassExpr::Not(name.into())
	}
}

/// Characteristics of a named role (spec.md §3).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoleCharacteristics {
	pub transitive: bool,
	pub symmetric: bool,
	pub asymmetric: bool,
	pub reflexive: bool,
	pub irreflexive: bool,
	pub functional: bool,
	pub inverse_functional: bool,
}

/// An immutable ontology: TBox (class axioms + role box) and ABox
/// (individual assertions).
#[derive(Clone, Debug, Default)]
pub struct Ontology {
	pub roles: BTreeMap<String, RoleCharacteristics>,
	/// `sub ⊑ super` role hierarchy edges.
	pub role_hierarchy: Vec<(RoleExpr, RoleExpr)>,
	/// `R₁ ∘ R₂ ⊑ S` property chains.
	pub role_chains: Vec<(Vec<RoleExpr>, RoleExpr)>,
	/// General class inclusions `C ⊑ D`, stored as `(C, D)`. Disjointness
	/// axioms `C ⊓ D ⊑ ⊥` are just GCIs with `D = Bottom`'s surrounding
	/// conjunction folded in by the caller.
	pub tbox: Vec<(ClassExpr, ClassExpr)>,
	pub domain: Vec<(RoleExpr, ClassExpr)>,
	pub range: Vec<(RoleExpr, ClassExpr)>,
	/// `a : C`.
	pub abox_concepts: Vec<(String, ClassExpr)>,
	/// `(from, role, to)`.
	pub abox_roles: Vec<(String, RoleExpr, String)>,
}

impl Ontology {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn declare_role(&mut self, name: impl Into<String>, chars: RoleCharacteristics) -> &mut Self {
		self.roles.insert(name.into(), chars);
		self
	}

	pub fn subclass(&mut self, sub: ClassExpr, sup: ClassExpr) -> &mut Self {
		self.tbox.push((sub, sup));
		self
	}

	pub fn disjoint(&mut self, a: ClassExpr, b: ClassExpr) -> &mut Self {
		self.tbox.push((ClassExpr::and([a, b]), ClassExpr::Bottom));
		self
	}

	pub fn assert_concept(&mut self, individual: impl Into<String>, class: ClassExpr) -> &mut Self {
		self.abox_concepts.push((individual.into(), class));
		self
	}

	pub fn assert_role(&mut self, from: impl Into<String>, role: RoleExpr, to: impl Into<String>) -> &mut Self {
		self.abox_roles.push((from.into(), role, to.into()));
		self
	}

	pub fn characteristics(&self, role: &RoleExpr) -> RoleCharacteristics {
		self.roles.get(role.base_name()).cloned().unwrap_or_default()
	}

	/// Every direct super-role of `role` along the declared hierarchy
	/// (non-transitive closure; `tableau.rs` walks this repeatedly when it
	/// needs the full ancestry).
	pub fn direct_super_roles(&self, role: &RoleExpr) -> Vec<RoleExpr> {
		self.role_hierarchy.iter().filter(|(sub, _)| sub == role).map(|(_, sup)| sup.clone()).collect()
	}

	/// Whether `role` (or any of its declared super-roles, or any role that
	/// is non-simple via a chain) is flagged non-simple for the purposes of
	/// the DL regularity check — transitive roles and roles with a
	/// contributing chain axiom cannot legally appear in a cardinality
	/// restriction (spec.md §4.K: "Regularity check").
	pub fn is_non_simple(&self, role: &RoleExpr) -> bool {
		if self.characteristics(role).transitive {
			return true;
		}
		self.role_chains.iter().any(|(_, head)| head == role)
	}
}
