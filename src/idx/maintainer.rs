//! The index-maintainer interface (spec.md §4.E).
//!
//! `maintain` is what a record write calls for every index descriptor
//! registered against the record's type: it extracts the fields each
//! maintainer kind needs from the old/new record images, builds that kind's
//! native update payload, and submits the diff inside the caller's
//! transaction. Mirrors the teacher's `idx::index::Indexable` trait, which
//! plays the same "one interface per index family, different extraction per
//! kind" role for SurrealDB's own index maintainers.
use crate::err::Error;
use crate::idx::graph::Edge;
use crate::idx::leaderboard::LeaderboardEntry;
use crate::idx::{IndexDescriptor, IndexKind};
use crate::kvs::Transaction;
use crate::record::Record;
use crate::value::Value;

fn field(record: &Record, name: &str) -> Result<Value, Error> {
	record
		.field(name)
		.cloned()
		.ok_or_else(|| Error::PathError(format!("record missing field {name:?} required by index")))
}

fn optional_field(record: &Record, name: &str) -> Option<Value> {
	record.field(name).cloned().filter(|v| !matches!(v, Value::Null))
}

/// Builds an [`Edge`] from a record using `extracted_fields` as
/// `["from", "predicate", "to", "graph"?, ...storedFields]`. `graph` is
/// present only when the descriptor's extracted fields include a fourth
/// entry named `"graph"`.
fn edge_from_record(record: &Record, extracted_fields: &[String]) -> Result<Edge, Error> {
	if extracted_fields.len() < 3 {
		return Err(Error::PathError("graph index requires at least [from, predicate, to]".into()));
	}
	let from = field(record, &extracted_fields[0])?;
	let predicate = field(record, &extracted_fields[1])?;
	let to = field(record, &extracted_fields[2])?;
	let (graph, stored_start) = if extracted_fields.get(3).map(String::as_str) == Some("graph") {
		(optional_field(record, "graph"), 4)
	} else {
		(None, 3)
	};
	let stored_fields = &extracted_fields[stored_start..];
	let stored_props = if stored_fields.is_empty() {
		None
	} else {
		Some(stored_fields.iter().map(|f| (f.clone(), optional_field(record, f))).collect())
	};
	Ok(Edge { from, predicate, to, graph, pk: record.pk.clone(), stored_props })
}

fn point_from_record(record: &Record, extracted_fields: &[String]) -> Result<(f64, f64), Error> {
	let lat_name = extracted_fields.first().map(String::as_str).unwrap_or("lat");
	let lon_name = extracted_fields.get(1).map(String::as_str).unwrap_or("lon");
	let lat = field(record, lat_name)?
		.as_float()
		.ok_or_else(|| Error::PathError(format!("field {lat_name:?} is not numeric")))?;
	let lon = field(record, lon_name)?
		.as_float()
		.ok_or_else(|| Error::PathError(format!("field {lon_name:?} is not numeric")))?;
	Ok((lat, lon))
}

fn score_from_record(record: &Record, extracted_fields: &[String]) -> Result<i64, Error> {
	let score_name = extracted_fields.first().map(String::as_str).unwrap_or("score");
	field(record, score_name)?.as_int().ok_or_else(|| Error::PathError(format!("field {score_name:?} is not an integer")))
}

/// Computes and applies one index descriptor's diff for a single record
/// write (spec.md §4.E). `now_epoch_seconds` is only consulted by
/// leaderboard indexes, to resolve the current `windowID`.
pub async fn maintain<T: Transaction>(
	descriptor: &IndexDescriptor,
	old: Option<&Record>,
	new: Option<&Record>,
	now_epoch_seconds: i64,
	txn: &mut T,
) -> Result<(), Error> {
	match &descriptor.kind {
		IndexKind::Graph(m) => {
			let old_edge = old.map(|r| edge_from_record(r, &descriptor.extracted_fields)).transpose()?;
			let new_edge = new.map(|r| edge_from_record(r, &descriptor.extracted_fields)).transpose()?;
			m.update_index(old_edge.as_ref(), new_edge.as_ref(), txn).await
		}
		IndexKind::Spatial(m) => {
			let old_point = old
				.map(|r| point_from_record(r, &descriptor.extracted_fields).map(|(lat, lon)| (r.pk.clone(), lat, lon)))
				.transpose()?;
			let new_point = new
				.map(|r| point_from_record(r, &descriptor.extracted_fields).map(|(lat, lon)| (r.pk.clone(), lat, lon)))
				.transpose()?;
			m.update_index(
				old_point.as_ref().map(|(pk, lat, lon)| (pk, *lat, *lon)),
				new_point.as_ref().map(|(pk, lat, lon)| (pk, *lat, *lon)),
				txn,
			)
			.await
		}
		IndexKind::Leaderboard(m) => {
			let window = m.config().window.window_id(now_epoch_seconds);
			let old_entry = old
				.map(|r| score_from_record(r, &descriptor.extracted_fields))
				.transpose()?
				.map(|score| LeaderboardEntry { window, pk: old.unwrap().pk.clone(), score });
			let new_entry = new
				.map(|r| score_from_record(r, &descriptor.extracted_fields))
				.transpose()?
				.map(|score| LeaderboardEntry { window, pk: new.unwrap().pk.clone(), score });
			m.update_index(old_entry.as_ref(), new_entry.as_ref(), txn).await
		}
	}
}

/// Marker trait kept for symmetry with the maintainer-family structs; the
/// actual dispatch lives in [`maintain`] since each family's native update
/// payload has a different shape extracted from the same [`Record`]s.
pub trait IndexMaintainer {
	fn name(&self) -> &str;
}

impl IndexMaintainer for IndexDescriptor {
	fn name(&self) -> &str {
		&self.name
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::idx::graph::{GraphIndexMaintainer, Strategy};
	use crate::idx::leaderboard::{LeaderboardMaintainer, Window, WindowConfig};
	use crate::idx::spatial::{Encoding, SpatialConfig, SpatialIndexMaintainer};
	use crate::kvs::{Datastore, MemoryDatastore};
	use crate::subspace::Directory;

	fn graph_descriptor() -> IndexDescriptor {
		let dir = Directory::new();
		let m = GraphIndexMaintainer::new("knows", dir.resolve(&["knows"]), Strategy::TripleStore, vec!["weight".into()]);
		m.state().enable().unwrap();
		m.state().make_readable().unwrap();
		IndexDescriptor::new(
			"knows",
			vec!["Person".into()],
			vec!["from".into(), "predicate".into(), "to".into(), "weight".into()],
			IndexKind::Graph(m),
		)
	}

	#[tokio::test]
	async fn maintain_extracts_edge_fields_and_writes_graph_index() {
		let desc = graph_descriptor();
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		let rec = Record::new(Value::from("e1"), "Person")
			.with_field("from", "Alice")
			.with_field("predicate", "knows")
			.with_field("to", "Bob")
			.with_field("weight", 3i64);
		maintain(&desc, None, Some(&rec), 0, &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let IndexKind::Graph(m) = &desc.kind else { unreachable!() };
		let mut tx = ds.transaction(false).await.unwrap();
		let mut scan = m.scan_edges(Some(Value::from("Alice")), None, None, None).unwrap();
		let edge = scan.next(&mut tx).await.unwrap().unwrap();
		assert_eq!(edge.to, Value::from("Bob"));
		assert_eq!(edge.stored_props.unwrap().get("weight"), Some(&Some(Value::from(3i64))));
	}

	#[tokio::test]
	async fn maintain_dispatches_spatial_and_leaderboard_kinds() {
		let dir = Directory::new();
		let sm = SpatialIndexMaintainer::new("poi", dir.resolve(&["poi"]), SpatialConfig { encoding: Encoding::Morton, level: 10 });
		sm.state().enable().unwrap();
		sm.state().make_readable().unwrap();
		let spatial_desc =
			IndexDescriptor::new("poi", vec!["Place".into()], vec!["lat".into(), "lon".into()], IndexKind::Spatial(sm));

		let lb = LeaderboardMaintainer::new("season", dir.resolve(&["season"]), WindowConfig { window: Window::Daily, window_count: 7 });
		lb.state().enable().unwrap();
		lb.state().make_readable().unwrap();
		let lb_desc = IndexDescriptor::new("season", vec!["Player".into()], vec!["score".into()], IndexKind::Leaderboard(lb));

		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		let place = Record::new(Value::from("p1"), "Place").with_field("lat", 10.0).with_field("lon", 20.0);
		maintain(&spatial_desc, None, Some(&place), 0, &mut tx).await.unwrap();
		let player = Record::new(Value::from("pl1"), "Player").with_field("score", 99i64);
		maintain(&lb_desc, None, Some(&player), 86_400, &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let IndexKind::Leaderboard(m) = &lb_desc.kind else { unreachable!() };
		let mut tx = ds.transaction(false).await.unwrap();
		let top = m.get_top_k(crate::idx::leaderboard::WindowId(1), 1, &mut tx).await.unwrap();
		assert_eq!(top, vec![(Value::from("pl1"), 99)]);
	}
}
