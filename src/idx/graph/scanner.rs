//! Lazy edge scanning and property-filter pushdown (spec.md §4.F, §4.G).
use std::collections::VecDeque;

use crate::err::Error;
use crate::idx::graph::{decode_stored_props, Edge, GraphComponent as Component};
use crate::kvs::{Key, Transaction, Val};
use crate::value::Value;

/// How many KV pairs one batch pulls in before handing control back to the
/// caller (spec.md §5: "the consumer drives further expansion").
const BATCH_SIZE: u32 = 256;

/// A cursor over one permutation's key range.
///
/// Only issues a KV `scan` when its internal buffer runs dry, and stops
/// issuing scans the moment the caller drops it mid-iteration — this is the
/// crate's "async sequence" primitive (spec.md §5), expressed as an explicit
/// pull rather than a `futures::Stream` because [`Transaction`]'s methods
/// are generic (so the trait is not object-safe, the same constraint that
/// leads the teacher to dispatch over an enum instead of `dyn Transaction`).
pub struct EdgeScan {
	cursor: Key,
	end: Key,
	prefix_len: usize,
	order: [Component; 3],
	has_graph: bool,
	stored_fields: Vec<String>,
	buffer: VecDeque<(Key, Val)>,
	done: bool,
}

impl EdgeScan {
	pub(crate) fn new(
		begin: Key,
		end: Key,
		prefix_len: usize,
		order: [Component; 3],
		has_graph: bool,
		stored_fields: Vec<String>,
	) -> Self {
		Self {
			cursor: begin,
			end,
			prefix_len,
			order,
			has_graph,
			stored_fields,
			buffer: VecDeque::new(),
			done: false,
		}
	}

	/// Pulls the next edge, refilling the internal buffer with one more KV
	/// batch if needed. Returns `Ok(None)` once the range is exhausted.
	pub async fn next<T: Transaction>(&mut self, txn: &mut T) -> Result<Option<Edge>, Error> {
		if self.buffer.is_empty() && !self.done {
			let got = txn.scan(self.cursor.clone()..self.end.clone(), BATCH_SIZE).await?;
			if (got.len() as u32) < BATCH_SIZE {
				self.done = true;
			}
			if let Some((last_key, _)) = got.last() {
				let mut next_cursor = last_key.clone();
				next_cursor.push(0x00);
				self.cursor = next_cursor;
			} else {
				self.done = true;
			}
			self.buffer.extend(got);
		}

		let Some((key, val)) = self.buffer.pop_front() else {
			return Ok(None);
		};
		let tail = crate::codec::unpack(&key[self.prefix_len.min(key.len())..])?;
		let edge = super::GraphIndexMaintainer::decode_entry(
			self.order,
			self.has_graph,
			&tail,
			&val,
			&self.stored_fields,
		)?;
		Ok(Some(edge))
	}

	/// Drains the remainder of the scan, applying `filters` and stopping
	/// early once `limit` (if any) edges survive. A convenience over
	/// repeated [`next`](Self::next) calls for call sites that don't need
	/// genuine laziness.
	pub async fn collect_filtered<T: Transaction>(
		&mut self,
		txn: &mut T,
		filters: &[PropertyFilter],
		limit: Option<usize>,
	) -> Result<Vec<Edge>, Error> {
		let mut out = Vec::new();
		while let Some(edge) = self.next(txn).await? {
			if filters.iter().all(|f| f.accepts(&edge)) {
				out.push(edge);
				if let Some(limit) = limit {
					if out.len() >= limit {
						break;
					}
				}
			}
		}
		Ok(out)
	}
}

/// A comparison operator over one stored or non-stored property (spec.md
/// §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyOp {
	Eq,
	Ne,
	Lt,
	Le,
	Gt,
	Ge,
	Contains,
	IsNil,
	IsNotNil,
	Regex,
}

/// One predicate in a property-filter conjunction.
///
/// `field` names a key in the edge's stored-property map. Filters on fields
/// that are part of this maintainer's `storedFields` are pushed down (tested
/// directly against the decoded edge, with no extra KV I/O); filters on any
/// other field are necessarily post-scan, since that field was never
/// persisted in the index's value (spec.md §4.G: "stored-field pushdown vs.
/// post-scan split").
#[derive(Debug, Clone)]
pub struct PropertyFilter {
	pub field: String,
	pub op: PropertyOp,
	pub value: Option<Value>,
	pub regex: Option<regex::Regex>,
}

impl PropertyFilter {
	pub fn new(field: impl Into<String>, op: PropertyOp, value: Option<Value>) -> Self {
		Self { field: field.into(), op, value, regex: None }
	}

	pub fn regex(field: impl Into<String>, pattern: &str) -> Result<Self, Error> {
		let re = regex::Regex::new(pattern).map_err(|e| Error::codec(e.to_string()))?;
		Ok(Self { field: field.into(), op: PropertyOp::Regex, value: None, regex: Some(re) })
	}

	/// Whether this filter is answerable purely from `stored_fields` without
	/// touching the original record (spec.md §4.G's pushdown contract).
	pub fn is_pushable(&self, stored_fields: &[String]) -> bool {
		stored_fields.iter().any(|f| f == &self.field)
	}

	/// `nil` (absent from the edge's stored-property map) is distinct from
	/// any present value, including an empty string or empty tuple — the
	/// null-vs-empty semantics spec.md §4.G calls out explicitly.
	pub fn accepts(&self, edge: &Edge) -> bool {
		let current = edge
			.stored_props
			.as_ref()
			.and_then(|m| m.get(&self.field))
			.and_then(|v| v.clone());

		match self.op {
			PropertyOp::IsNil => current.is_none(),
			PropertyOp::IsNotNil => current.is_some(),
			PropertyOp::Regex => match (&current, &self.regex) {
				(Some(Value::String(s)), Some(re)) => re.is_match(s),
				_ => false,
			},
			_ => {
				let (Some(current), Some(expected)) = (current, &self.value) else {
					return false;
				};
				match self.op {
					PropertyOp::Eq => &current == expected,
					PropertyOp::Ne => &current != expected,
					PropertyOp::Lt | PropertyOp::Le | PropertyOp::Gt | PropertyOp::Ge => {
						match (current.as_float(), expected.as_float()) {
							(Some(a), Some(b)) => {
								let ord = crate::value::total_cmp_f64(a, b);
								match self.op {
									PropertyOp::Lt => ord == std::cmp::Ordering::Less,
									PropertyOp::Le => ord != std::cmp::Ordering::Greater,
									PropertyOp::Gt => ord == std::cmp::Ordering::Greater,
									PropertyOp::Ge => ord != std::cmp::Ordering::Less,
									_ => unreachable!(),
								}
							}
							_ => false,
						}
					}
					PropertyOp::Contains => match (&current, expected) {
						(Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
						(Value::Tuple(items), needle) => items.contains(needle),
						_ => false,
					},
					PropertyOp::IsNil | PropertyOp::IsNotNil | PropertyOp::Regex => unreachable!(),
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn edge_with(field: &str, value: Option<Value>) -> Edge {
		let mut props = std::collections::BTreeMap::new();
		props.insert(field.to_string(), value);
		Edge {
			from: Value::from("a"),
			predicate: Value::from("p"),
			to: Value::from("b"),
			graph: None,
			pk: Value::from("pk"),
			stored_props: Some(props),
		}
	}

	#[test]
	fn is_nil_distinguishes_absent_from_empty_string() {
		let absent = edge_with("note", None);
		let empty = edge_with("note", Some(Value::from("")));
		let f = PropertyFilter::new("note", PropertyOp::IsNil, None);
		assert!(f.accepts(&absent));
		assert!(!f.accepts(&empty), "empty string is present, not nil");
	}

	#[test]
	fn eq_matches_exact_value() {
		let e = edge_with("weight", Some(Value::from(5i64)));
		let f = PropertyFilter::new("weight", PropertyOp::Eq, Some(Value::from(5i64)));
		assert!(f.accepts(&e));
		let f_ne = PropertyFilter::new("weight", PropertyOp::Eq, Some(Value::from(6i64)));
		assert!(!f_ne.accepts(&e));
	}

	#[test]
	fn ordering_ops_compare_numerically() {
		let e = edge_with("weight", Some(Value::from(5i64)));
		assert!(PropertyFilter::new("weight", PropertyOp::Lt, Some(Value::from(10i64))).accepts(&e));
		assert!(!PropertyFilter::new("weight", PropertyOp::Lt, Some(Value::from(1i64))).accepts(&e));
		assert!(PropertyFilter::new("weight", PropertyOp::Ge, Some(Value::from(5i64))).accepts(&e));
	}

	#[test]
	fn contains_checks_substring_or_tuple_membership() {
		let e = edge_with("tags", Some(Value::Tuple(vec![Value::from("a"), Value::from("b")])));
		assert!(PropertyFilter::new("tags", PropertyOp::Contains, Some(Value::from("a"))).accepts(&e));
		assert!(!PropertyFilter::new("tags", PropertyOp::Contains, Some(Value::from("z"))).accepts(&e));
	}

	#[test]
	fn regex_matches_string_field() {
		let e = edge_with("name", Some(Value::from("hello world")));
		let f = PropertyFilter::regex("name", "^hello").unwrap();
		assert!(f.accepts(&e));
		let f2 = PropertyFilter::regex("name", "^world").unwrap();
		assert!(!f2.accepts(&e));
	}

	#[test]
	fn pushability_checks_stored_fields_membership() {
		let f = PropertyFilter::new("weight", PropertyOp::Eq, Some(Value::from(1i64)));
		assert!(f.is_pushable(&["weight".to_string()]));
		assert!(!f.is_pushable(&["other".to_string()]));
	}
}
