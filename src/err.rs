//! The error type returned by every fallible operation in this crate.
use thiserror::Error;

/// Errors produced by the record-and-graph engine core.
///
/// Variant names follow the taxonomy in the specification's error-handling
/// section rather than the call site that raises them, so callers can match
/// on a stable vocabulary regardless of which component failed.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
	/// A tuple element could not be encoded or decoded.
	#[error("codec error: {0}")]
	CodecError(String),

	/// An index lifecycle transition was attempted that the state machine
	/// does not allow (e.g. `disabled -> readable` directly).
	#[error("invalid index state transition: {0}")]
	InvalidTransition(String),

	/// A scan or write was attempted against an index that is not in the
	/// required lifecycle state.
	#[error("index `{index}` is {state} and does not admit {operation}")]
	IndexStateError {
		index: String,
		state: &'static str,
		operation: &'static str,
	},

	/// The named index does not exist on the record type.
	#[error("index `{0}` not found")]
	IndexNotFound(String),

	/// A property-path AST was malformed (e.g. `oneOrMore` over a `null`
	/// inner path).
	#[error("malformed property path: {0}")]
	PathError(String),

	/// Parameters passed to `executeKNN` failed validation.
	#[error("invalid knn parameters: {0}")]
	InvalidKnnParameters(String),

	/// Parameters passed to `searchRadius` failed validation.
	#[error("invalid radius: {0}")]
	InvalidRadius(String),

	/// A polygon query was given fewer than 3 vertices (when validated) or
	/// otherwise malformed vertex data.
	#[error("invalid polygon: {0}")]
	InvalidPolygon(String),

	/// A spatial query was issued without the filter its index strategy
	/// requires (e.g. a bounding box query with no box).
	#[error("spatial query is missing a required constraint")]
	NoConstraint,

	/// The ontology failed the DL regularity check and the reasoner is
	/// configured to abort rather than proceed best-effort.
	#[error("ontology fails regularity check: {0}")]
	RegularityViolation(String),

	/// The reasoner hit `maxExpansionSteps` before reaching a fixpoint. Not
	/// constructed on the reasoner's hot path — that outcome is reported as
	/// `Satisfiability::Unknown` in the result status rather than thrown —
	/// but kept on the taxonomy for callers that need to propagate it as an
	/// error across a boundary that only carries `Result`.
	#[error("reasoner exceeded maxExpansionSteps")]
	ExpansionLimitExceeded,

	/// A KV transaction is already closed (committed or cancelled).
	#[error("transaction is already closed")]
	TxFinished,

	/// A write was attempted on a read-only transaction.
	#[error("transaction is read-only")]
	TxReadonly,

	/// A key in the store could not be found when one was required.
	#[error("key not found")]
	KeyNotFound,

	/// Catch-all for the in-memory reference KV backend's own bookkeeping
	/// failures; a production backend would surface its native error here.
	#[error("storage error: {0}")]
	Tx(String),
}

impl Error {
	pub(crate) fn codec(msg: impl Into<String>) -> Self {
		Self::CodecError(msg.into())
	}
}
