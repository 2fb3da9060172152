//! Order-preserving tuple codec (spec.md §4.B).
//!
//! Every index key in this crate is a packed [`Tuple`]. Encoding goes
//! through `storekey`, the same order-preserving serde backend the teacher
//! codebase uses for every `key::*` struct (see `key/graph/mod.rs`): a
//! struct's/sequence's encoding is built by concatenating each field's own
//! encoding with no overall length prefix, so the encoding of a shorter
//! tuple is always a byte-prefix of the encoding of any tuple that extends
//! it. That composability is exactly what `range` below relies on.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::err::Error;
use crate::value::total_cmp_f64;

/// One element of a packed tuple.
///
/// Variants carry an implicit discriminant (via `storekey`'s default enum
/// encoding) so that values of different kinds never compare equal, even
/// when their payloads coincide byte-for-byte (spec.md §4.B: "a string
/// never equals the encoding of an integer").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Element {
	Null,
	Bool(bool),
	Int(i64),
	/// IEEE-754 double. Ordering is the standard total order with
	/// `-0.0 < 0.0` (spec.md §4.B), which is what `storekey` produces for
	/// `f64` and what [`total_cmp_f64`] checks in tests.
	Float(f64),
	String(String),
	Bytes(Vec<u8>),
	Tuple(Vec<Element>),
}

impl Element {
	fn kind_rank(&self) -> u8 {
		match self {
			Element::Null => 0,
			Element::Bool(_) => 1,
			Element::Int(_) => 2,
			Element::Float(_) => 3,
			Element::String(_) => 4,
			Element::Bytes(_) => 5,
			Element::Tuple(_) => 6,
		}
	}
}

/// The natural element-wise ordering defined component-wise on tuples
/// (spec.md §4.B), used by tests to check the codec's byte ordering
/// matches it (P2). Cross-kind order is well-defined (by declaration
/// order above) but not prescribed by the spec beyond "unambiguous".
impl PartialOrd for Element {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(match (self, other) {
			(Element::Null, Element::Null) => Ordering::Equal,
			(Element::Bool(a), Element::Bool(b)) => a.cmp(b),
			(Element::Int(a), Element::Int(b)) => a.cmp(b),
			(Element::Float(a), Element::Float(b)) => total_cmp_f64(*a, *b),
			(Element::String(a), Element::String(b)) => a.cmp(b),
			(Element::Bytes(a), Element::Bytes(b)) => a.cmp(b),
			(Element::Tuple(a), Element::Tuple(b)) => {
				for (x, y) in a.iter().zip(b.iter()) {
					match x.partial_cmp(y) {
						Some(Ordering::Equal) => continue,
						other => return other,
					}
				}
				a.len().cmp(&b.len())
			}
			_ => self.kind_rank().cmp(&other.kind_rank()),
		})
	}
}

impl From<&str> for Element {
	fn from(s: &str) -> Self {
		Element::String(s.to_owned())
	}
}
impl From<String> for Element {
	fn from(s: String) -> Self {
		Element::String(s)
	}
}
impl From<i64> for Element {
	fn from(i: i64) -> Self {
		Element::Int(i)
	}
}
impl From<f64> for Element {
	fn from(f: f64) -> Self {
		Element::Float(f)
	}
}
impl From<bool> for Element {
	fn from(b: bool) -> Self {
		Element::Bool(b)
	}
}
impl From<Vec<u8>> for Element {
	fn from(b: Vec<u8>) -> Self {
		Element::Bytes(b)
	}
}

/// An ordered, heterogeneous tuple of [`Element`]s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tuple(pub Vec<Element>);

impl Tuple {
	pub fn new(elements: impl Into<Vec<Element>>) -> Self {
		Self(elements.into())
	}

	pub fn push(&mut self, e: impl Into<Element>) -> &mut Self {
		self.0.push(e.into());
		self
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn extended(&self, more: impl IntoIterator<Item = Element>) -> Tuple {
		let mut v = self.0.clone();
		v.extend(more);
		Tuple(v)
	}
}

impl FromIterator<Element> for Tuple {
	fn from_iter<T: IntoIterator<Item = Element>>(iter: T) -> Self {
		Tuple(iter.into_iter().collect())
	}
}

/// `pack(elements) -> bytes`.
pub fn pack(tuple: &Tuple) -> Result<Vec<u8>, Error> {
	storekey::serialize(tuple).map_err(|e| Error::codec(e.to_string()))
}

/// `unpack(bytes) -> elements`.
pub fn unpack(bytes: &[u8]) -> Result<Tuple, Error> {
	storekey::deserialize(bytes).map_err(|e| Error::codec(e.to_string()))
}

/// `range(prefix) -> (beginKey, endKey)`: the half-open range covering
/// every key for which `prefix` is a proper prefix.
///
/// Mirrors the teacher's own `graph::prefix`/`graph::suffix` helpers
/// (`key/graph/mod.rs`), which append a single `0x00`/`0xff` sentinel byte
/// after a key's encoding to bound the range of any longer key extending
/// it. This relies on the codec never itself needing the raw bytes `0x00`
/// or `0xff` to terminate a top-level tuple — guaranteed because
/// `storekey` escapes those bytes wherever they occur inside a variable-
/// length element (strings, byte-strings).
pub fn range(prefix: &Tuple) -> Result<(Vec<u8>, Vec<u8>), Error> {
	let encoded = pack(prefix)?;
	let mut begin = encoded.clone();
	begin.push(0x00);
	let mut end = encoded;
	end.push(0xff);
	Ok((begin, end))
}
