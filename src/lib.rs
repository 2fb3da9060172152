//! A record-and-graph data engine core layered over an ordered
//! transactional key-value store.
//!
//! The crate is organized the way the teacher codebase organizes its own
//! storage layer: a KV contract (`kvs`), an order-preserving tuple codec
//! and subspace allocator underneath every key (`codec`, `subspace`), the
//! record model the rest of the crate diffs against (`record`, `value`),
//! the index family that sits above all of it (`idx`), and the OWL DL
//! reasoner as an independent component consuming none of the above
//! (`reasoner`).
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate tracing;

pub mod codec;
pub mod err;
pub mod idx;
pub mod kvs;
pub mod reasoner;
pub mod record;
pub mod subspace;
pub mod value;

pub use err::Error;
pub use record::{Pk, Record};
pub use value::Value;
