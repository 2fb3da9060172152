//! End-to-end scenarios from spec.md §8, each driven against the public
//! API across a real in-memory transaction rather than a single module's
//! internals.
use std::collections::BTreeMap;

use recordgraph_core::idx::graph::scanner::{PropertyFilter, PropertyOp};
use recordgraph_core::idx::graph::{Edge, GraphIndexMaintainer, Strategy};
use recordgraph_core::idx::leaderboard::{LeaderboardEntry, LeaderboardMaintainer, Window, WindowConfig, WindowId};
use recordgraph_core::idx::spatial::{Encoding, SpatialConfig, SpatialIndexMaintainer};
use recordgraph_core::kvs::{Datastore, MemoryDatastore};
use recordgraph_core::reasoner::{ClassExpr, Classifier, Ontology, ReasonerConfig, Satisfiability};
use recordgraph_core::subspace::Directory;
use recordgraph_core::Value;

fn edge(from: &str, pred: &str, to: &str, graph: &str, pk: &str) -> Edge {
	Edge { from: Value::from(from), predicate: Value::from(pred), to: Value::from(to), graph: Some(Value::from(graph)), pk: Value::from(pk), stored_props: None }
}

#[tokio::test]
async fn scenario_1_edge_diff_across_graph_move() {
	let dir = Directory::new();
	let maintainer = GraphIndexMaintainer::new("knows", dir.resolve(&["knows"]), Strategy::Hexastore, vec![]);
	maintainer.state().enable().unwrap();
	maintainer.state().make_readable().unwrap();

	let ds = MemoryDatastore::new();
	let mut tx = ds.transaction(true).await.unwrap();

	let in_g1 = edge("Alice", "knows", "Bob", "g1", "pk1");
	maintainer.update_index(None, Some(&in_g1), &mut tx).await.unwrap();

	let mut scan = maintainer.scan_edges(Some(Value::from("Alice")), None, None, Some(Value::from("g1"))).unwrap();
	let mut count = 0;
	while scan.next(&mut tx).await.unwrap().is_some() {
		count += 1;
	}
	assert_eq!(count, 1, "only one SPO-permutation entry is visible from a single scan prefix");

	// Move the edge to graph g2: delete + insert is one update_index call
	// with both images present.
	let in_g2 = edge("Alice", "knows", "Bob", "g2", "pk1");
	maintainer.update_index(Some(&in_g1), Some(&in_g2), &mut tx).await.unwrap();

	let mut scan_g1 = maintainer.scan_edges(Some(Value::from("Alice")), None, None, Some(Value::from("g1"))).unwrap();
	assert!(scan_g1.next(&mut tx).await.unwrap().is_none(), "g1-tagged entries are gone after the move");

	let mut scan_g2 = maintainer.scan_edges(Some(Value::from("Alice")), None, None, Some(Value::from("g2"))).unwrap();
	let found = scan_g2.next(&mut tx).await.unwrap().unwrap();
	assert_eq!(found.graph, Some(Value::from("g2")));
	assert_eq!(found.to, Value::from("Bob"));
}

#[tokio::test]
async fn scenario_2_property_path_filter_pushdown() {
	let dir = Directory::new();
	let maintainer = GraphIndexMaintainer::new("knows", dir.resolve(&["knows"]), Strategy::TripleStore, vec!["since".into(), "status".into()]);
	maintainer.state().enable().unwrap();
	maintainer.state().make_readable().unwrap();

	let ds = MemoryDatastore::new();
	let mut tx = ds.transaction(true).await.unwrap();

	let bob = Edge {
		from: Value::from("Alice"),
		predicate: Value::from("knows"),
		to: Value::from("Bob"),
		graph: None,
		pk: Value::from("e1"),
		stored_props: Some(BTreeMap::from([("since".into(), Some(Value::from(2020i64))), ("status".into(), Some(Value::from("active")))])),
	};
	let carol = Edge {
		from: Value::from("Alice"),
		predicate: Value::from("knows"),
		to: Value::from("Carol"),
		graph: None,
		pk: Value::from("e2"),
		stored_props: Some(BTreeMap::from([("since".into(), Some(Value::from(2019i64))), ("status".into(), Some(Value::from("inactive")))])),
	};
	maintainer.update_index(None, Some(&bob), &mut tx).await.unwrap();
	maintainer.update_index(None, Some(&carol), &mut tx).await.unwrap();

	let filter = PropertyFilter::new("since", PropertyOp::Ge, Some(Value::from(2020i64)));
	assert!(filter.is_pushable(maintainer.stored_fields()), "since is a stored field, so the filter pushes into the scan");

	let mut scan = maintainer.scan_edges(Some(Value::from("Alice")), Some(Value::from("knows")), None, None).unwrap();
	let results = scan.collect_filtered(&mut tx, &[filter], None).await.unwrap();
	assert_eq!(results.len(), 1);
	assert_eq!(results[0].to, Value::from("Bob"));
}

#[tokio::test]
async fn scenario_3_bfs_preserves_distinct_origins() {
	use recordgraph_core::idx::graph::path::{evaluate, Path};

	let dir = Directory::new();
	let maintainer = GraphIndexMaintainer::new("edge", dir.resolve(&["edge"]), Strategy::Adjacency, vec![]);
	maintainer.state().enable().unwrap();
	maintainer.state().make_readable().unwrap();

	let ds = MemoryDatastore::new();
	let mut tx = ds.transaction(true).await.unwrap();
	maintainer.update_index(None, Some(&edge("A", "p", "B", "g", "e1")), &mut tx).await.unwrap();
	maintainer.update_index(None, Some(&edge("B", "p", "C", "g", "e2")), &mut tx).await.unwrap();

	let path = Path::OneOrMore(Box::new(Path::Iri(Value::from("p"))));
	let pairs = evaluate(&path, &[Value::from("A"), Value::from("B")], &maintainer, &mut tx).await.unwrap();

	assert!(pairs.contains(&(Value::from("A"), Value::from("B"))));
	assert!(pairs.contains(&(Value::from("B"), Value::from("C"))));
	assert!(pairs.contains(&(Value::from("A"), Value::from("C"))));
	assert_eq!(pairs.len(), 3, "no spurious origin substitution for the shared node B");
}

#[tokio::test]
async fn scenario_4_knn_expansion_reports_completeness() {
	let dir = Directory::new();
	let maintainer = SpatialIndexMaintainer::new("poi", dir.resolve(&["poi"]), SpatialConfig { encoding: Encoding::Morton, level: 16 });
	maintainer.state().enable().unwrap();
	maintainer.state().make_readable().unwrap();

	let ds = MemoryDatastore::new();
	let mut tx = ds.transaction(true).await.unwrap();

	// Origin at (0, 0); points offset north by roughly 100m, 500m, 2km, 5km
	// (111.32 km per degree of latitude).
	let origin = (0.0_f64, 0.0_f64);
	let offsets_m = [100.0_f64, 500.0, 2_000.0, 5_000.0];
	for (i, off) in offsets_m.iter().enumerate() {
		let lat = off / 111_320.0;
		let pk = Value::from(format!("p{i}"));
		maintainer.update_index(None, Some((&pk, lat, origin.1)), &mut tx).await.unwrap();
	}

	let result = maintainer.execute_knn(origin.0, origin.1, 3, 0.2, 10.0, 2.0, &mut tx).await.unwrap();
	assert_eq!(result.results.len(), 3);
	assert!(result.is_complete);
	assert!(result.truncated_reason.is_none());

	let result5 = maintainer.execute_knn(origin.0, origin.1, 5, 0.2, 10.0, 2.0, &mut tx).await.unwrap();
	assert_eq!(result5.results.len(), 4, "only four points exist");
	assert!(!result5.is_complete);
	assert!(result5.truncated_reason.is_some());
}

#[tokio::test]
async fn scenario_5_leaderboard_rerank_on_update() {
	let dir = Directory::new();
	let maintainer = LeaderboardMaintainer::new("season", dir.resolve(&["season"]), WindowConfig { window: Window::Daily, window_count: 7 });
	maintainer.state().enable().unwrap();
	maintainer.state().make_readable().unwrap();

	let ds = MemoryDatastore::new();
	let mut tx = ds.transaction(true).await.unwrap();
	let window = WindowId(0);
	for (pk, score) in [("p1", 100i64), ("p2", 500), ("p3", 1000)] {
		maintainer.update_index(None, Some(&LeaderboardEntry { window, pk: Value::from(pk), score }), &mut tx).await.unwrap();
	}

	let top2 = maintainer.get_top_k(window, 2, &mut tx).await.unwrap();
	assert_eq!(top2, vec![(Value::from("p3"), 1000), (Value::from("p2"), 500)]);

	maintainer
		.update_index(
			Some(&LeaderboardEntry { window, pk: Value::from("p1"), score: 100 }),
			Some(&LeaderboardEntry { window, pk: Value::from("p1"), score: 2000 }),
			&mut tx,
		)
		.await
		.unwrap();

	let top2 = maintainer.get_top_k(window, 2, &mut tx).await.unwrap();
	assert_eq!(top2, vec![(Value::from("p1"), 2000), (Value::from("p3"), 1000)]);

	let rank_p2 = maintainer.get_rank(window, &Value::from("p2"), &mut tx).await.unwrap();
	assert_eq!(rank_p2, Some(3));
}

#[test]
fn scenario_6_tableau_subsumption() {
	let mut onto = Ontology::new();
	onto.subclass(ClassExpr::Named("Dog".into()), ClassExpr::Named("Mammal".into()));
	onto.subclass(ClassExpr::Named("Mammal".into()), ClassExpr::Named("Animal".into()));
	onto.disjoint(ClassExpr::Named("Animal".into()), ClassExpr::Named("Plant".into()));

	let mut clf = Classifier::new(&onto, ReasonerConfig::default());

	let dog_and_plant = ClassExpr::and([ClassExpr::Named("Dog".into()), ClassExpr::Named("Plant".into())]);
	let (sat, _) = clf.is_satisfiable(&dog_and_plant).unwrap();
	assert_eq!(sat, Satisfiability::Unsatisfiable);

	let animal_subsumes_dog = clf.subsumes(&ClassExpr::Named("Animal".into()), &ClassExpr::Named("Dog".into())).unwrap();
	assert!(!animal_subsumes_dog, "Animal ⊑ Dog does not hold");
}
