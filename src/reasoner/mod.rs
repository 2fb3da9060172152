//! The OWL DL (SHOIN(D)) tableau reasoner (spec.md §4.K–§4.L).
//!
//! `ontology` holds the TBox/RBox/ABox value types, `tableau` is the
//! completion-graph satisfiability procedure, and `classify` builds
//! subsumption answers on top of it. Callers typically only need
//! [`Classifier`]; the lower-level [`is_satisfiable`] is exposed for direct
//! satisfiability probes that don't need a whole class hierarchy.
pub mod classify;
pub mod ontology;
pub mod tableau;

pub use classify::Classifier;
pub use ontology::{ClassExpr, Ontology, RoleCharacteristics, RoleExpr};
pub use tableau::{abox_satisfiability, is_satisfiable, ReasonerConfig, Satisfiability, Stats};
