//! Index descriptors and the per-kind maintainer dispatch (spec.md §4.D–§4.E).
pub mod graph;
pub mod leaderboard;
pub mod maintainer;
pub mod spatial;
pub mod state;

use graph::GraphIndexMaintainer;
use leaderboard::LeaderboardMaintainer;
use spatial::SpatialIndexMaintainer;
use state::IndexStateMachine;

pub use maintainer::IndexMaintainer;

/// Polymorphs the three maintainer families over a single type rather than
/// a `dyn` trait object (spec.md §9, Redesign Flags: "re-architect as a
/// tagged variant `IndexKind`"). A `dyn` object is not viable here anyway —
/// [`crate::kvs::Transaction`]'s methods are generic over `K`/`V`, which
/// makes the trait itself non-object-safe.
pub enum IndexKind {
	Graph(GraphIndexMaintainer),
	Spatial(SpatialIndexMaintainer),
	Leaderboard(LeaderboardMaintainer),
}

impl IndexKind {
	pub fn name(&self) -> &str {
		match self {
			IndexKind::Graph(m) => m.name(),
			IndexKind::Spatial(m) => m.name(),
			IndexKind::Leaderboard(m) => m.name(),
		}
	}

	pub fn state(&self) -> &IndexStateMachine {
		match self {
			IndexKind::Graph(m) => m.state(),
			IndexKind::Spatial(m) => m.state(),
			IndexKind::Leaderboard(m) => m.state(),
		}
	}
}

/// `(name, subspace, kind, extracted fields, record types)` (spec.md §3).
///
/// `extracted_fields` names, in the maintainer-specific order documented on
/// each [`maintainer`] extraction function, which [`crate::record::Record`]
/// fields feed this index (e.g. `["from", "predicate", "to"]` for a graph
/// index, `["lat", "lon"]` for a spatial one).
pub struct IndexDescriptor {
	pub name: String,
	pub record_types: Vec<String>,
	pub extracted_fields: Vec<String>,
	pub kind: IndexKind,
}

impl IndexDescriptor {
	pub fn new(name: impl Into<String>, record_types: Vec<String>, extracted_fields: Vec<String>, kind: IndexKind) -> Self {
		Self { name: name.into(), record_types, extracted_fields, kind }
	}

	/// Whether this index applies to `persistable_type` (spec.md §3:
	/// "record types").
	pub fn applies_to(&self, persistable_type: &str) -> bool {
		self.record_types.iter().any(|t| t == persistable_type)
	}
}
