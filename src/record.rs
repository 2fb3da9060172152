//! Records: the unit of persistence that index maintainers read diffs from.
use std::collections::BTreeMap;

use crate::value::Value;

/// A primary key. Opaque to the core beyond its ordered-element encoding.
pub type Pk = Value;

/// A record image: a primary key, a type tag, and a set of typed fields.
///
/// The core never interprets `fields` beyond what an index descriptor
/// extracts (spec.md §3: "The core treats fields opaquely except where an
/// index declares a field of known semantic type").
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
	pub pk: Pk,
	pub persistable_type: String,
	pub fields: BTreeMap<String, Value>,
}

impl Record {
	pub fn new(pk: Pk, persistable_type: impl Into<String>) -> Self {
		Self {
			pk,
			persistable_type: persistable_type.into(),
			fields: BTreeMap::new(),
		}
	}

	pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.fields.insert(name.into(), value.into());
		self
	}

	pub fn field(&self, name: &str) -> Option<&Value> {
		self.fields.get(name)
	}
}
