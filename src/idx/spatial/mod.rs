//! Spatial-index maintainer (spec.md §4.I).
//!
//! Two cell encodings share one storage shape: `(cellId, PK) -> (lat, lon)`
//! under the index's subspace, grouped so that every point inside one cell
//! packs to a contiguous key range (`Subspace::range_for`). Grounded on the
//! teacher's `idx::ft` full-text postings layout for the "one posting list
//! per bucket, refine candidates against the live value" shape, adapted
//! here to buckets of geography instead of buckets of term.
use geo::HaversineDistance;
use geo_types::Point;

use crate::codec::{Element, Tuple};
use crate::err::Error;
use crate::idx::state::IndexStateMachine;
use crate::kvs::Transaction;
use crate::subspace::Subspace;
use crate::value::Value;

const TARGET: &str = "recordgraph_core::idx::spatial";

/// Which cell-ID scheme a spatial index uses (spec.md §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
	/// Six-face cube projection with a `2*level`-bit quadtree path per
	/// face, packed into a 64-bit cell ID.
	S2,
	/// Bit-interleaved (Z-order) latitude/longitude grid index.
	Morton,
}

/// `{encoding, level}` (spec.md §9's config objects table).
#[derive(Debug, Clone, Copy)]
pub struct SpatialConfig {
	pub encoding: Encoding,
	/// Grid resolution. Typical range 6..20 (spec.md §4.I).
	pub level: u8,
}

/// A safety cap on how many cells a single covering computation may
/// enumerate, independent of any query-level result cap (spec.md §4.I:
/// "count-limited to a safety cap").
const MAX_COVERING_CELLS: usize = 4096;

fn clamp_level(level: u8) -> u8 {
	level.min(26)
}

/// Maps `lat ∈ [-90, 90]`, `lon ∈ [-180, 180]` onto a `level`-bit grid
/// index pair `(i, j)`.
fn grid_index(lat: f64, lon: f64, level: u8) -> (u64, u64) {
	let n = 1u64 << clamp_level(level);
	let lat = lat.clamp(-90.0, 90.0);
	let lon = lon.clamp(-180.0, 180.0);
	let i = (((lat + 90.0) / 180.0) * n as f64).floor().clamp(0.0, (n - 1) as f64) as u64;
	let j = (((lon + 180.0) / 360.0) * n as f64).floor().clamp(0.0, (n - 1) as f64) as u64;
	(i, j)
}

/// Interleaves the bits of `i` and `j` (low bit of `i` first), the Morton /
/// Z-order encoding.
fn interleave(i: u64, j: u64, level: u8) -> u64 {
	let mut out = 0u64;
	for bit in 0..level as u32 {
		out |= ((i >> bit) & 1) << (2 * bit);
		out |= ((j >> bit) & 1) << (2 * bit + 1);
	}
	out
}

/// Picks one of six cube faces by the dominant axis of the point's unit
/// sphere projection, the same partition real S2 implementations use
/// before quantizing within a face.
fn s2_face(lat: f64, lon: f64) -> u8 {
	let lat_r = lat.to_radians();
	let lon_r = lon.to_radians();
	let x = lat_r.cos() * lon_r.cos();
	let y = lat_r.cos() * lon_r.sin();
	let z = lat_r.sin();
	let ax = x.abs();
	let ay = y.abs();
	let az = z.abs();
	if ax >= ay && ax >= az {
		if x >= 0.0 {
			0
		} else {
			1
		}
	} else if ay >= ax && ay >= az {
		if y >= 0.0 {
			2
		} else {
			3
		}
	} else if z >= 0.0 {
		4
	} else {
		5
	}
}

/// `encode(point) -> cellId` for [`Encoding::S2`]: `[face:3][level:5][2*level-bit quadtree path]`.
pub fn encode_s2(lat: f64, lon: f64, level: u8) -> u64 {
	let level = clamp_level(level);
	let face = s2_face(lat, lon) as u64;
	let (i, j) = grid_index(lat, lon, level);
	let path = interleave(i, j, level);
	(face << 61) | ((level as u64) << 56) | path
}

/// `encode(point) -> cellId` for [`Encoding::Morton`].
pub fn encode_morton(lat: f64, lon: f64, level: u8) -> u64 {
	let level = clamp_level(level);
	let (i, j) = grid_index(lat, lon, level);
	interleave(i, j, level)
}

pub fn encode(encoding: Encoding, lat: f64, lon: f64, level: u8) -> u64 {
	match encoding {
		Encoding::S2 => encode_s2(lat, lon, level),
		Encoding::Morton => encode_morton(lat, lon, level),
	}
}

/// Inverse of [`interleave`]: recovers `(i, j)` from a `level`-bit Z-order
/// path.
fn deinterleave(path: u64, level: u8) -> (u64, u64) {
	let mut i = 0u64;
	let mut j = 0u64;
	for bit in 0..level as u32 {
		i |= ((path >> (2 * bit)) & 1) << bit;
		j |= ((path >> (2 * bit + 1)) & 1) << bit;
	}
	(i, j)
}

/// Inverse of [`grid_index`]: the lat/lon of the cell `(i, j)`'s center, at
/// `level` bits of resolution.
fn grid_to_point(i: u64, j: u64, level: u8) -> (f64, f64) {
	let n = 1u64 << clamp_level(level);
	let lat = (i as f64 + 0.5) / n as f64 * 180.0 - 90.0;
	let lon = (j as f64 + 0.5) / n as f64 * 360.0 - 180.0;
	(lat, lon)
}

/// `decode(cellId) -> point` for [`Encoding::S2`]: the face/level header
/// bits only disambiguate which face the encoder chose, not the position —
/// the quadtree path alone already determines the grid cell, so this reuses
/// the same inverse as [`decode_morton`].
pub fn decode_s2(cell: u64) -> (f64, f64) {
	let level = ((cell >> 56) & 0x1f) as u8;
	let path = cell & ((1u64 << 56) - 1);
	let (i, j) = deinterleave(path, level);
	grid_to_point(i, j, level)
}

/// `decode(cellId) -> point` for [`Encoding::Morton`]. The level isn't
/// recoverable from the cell ID alone, so the caller's configured level is
/// required.
pub fn decode_morton(cell: u64, level: u8) -> (f64, f64) {
	let level = clamp_level(level);
	let (i, j) = deinterleave(cell, level);
	grid_to_point(i, j, level)
}

/// `decode(cellId) -> point` (spec.md §4.I, property P9: `encode(decode(k))`
/// round-trips to `k`). [`Encoding::Morton`] needs the configured level
/// since it isn't embedded in the cell ID the way it is for S2.
pub fn decode(encoding: Encoding, cell: u64, level: u8) -> (f64, f64) {
	match encoding {
		Encoding::S2 => decode_s2(cell),
		Encoding::Morton => decode_morton(cell, level),
	}
}

fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
	let a = Point::new(lon1, lat1);
	let b = Point::new(lon2, lat2);
	a.haversine_distance(&b) / 1000.0
}

/// Point-in-polygon via the even-odd ray-casting rule (`mode = simple`).
fn ray_cast_contains(vertices: &[(f64, f64)], lat: f64, lon: f64) -> bool {
	let mut inside = false;
	let n = vertices.len();
	let mut j = n - 1;
	for i in 0..n {
		let (lat_i, lon_i) = vertices[i];
		let (lat_j, lon_j) = vertices[j];
		if (lon_i > lon) != (lon_j > lon) {
			let x_intersect = (lat_j - lat_i) * (lon - lon_i) / (lon_j - lon_i) + lat_i;
			if lat < x_intersect {
				inside = !inside;
			}
		}
		j = i;
	}
	inside
}

/// Point-in-convex-polygon by checking the cross-product sign is the same
/// (or zero) turning around every edge (`mode = convex`).
fn convex_contains(vertices: &[(f64, f64)], lat: f64, lon: f64) -> bool {
	let n = vertices.len();
	let mut sign = 0f64;
	for i in 0..n {
		let (x1, y1) = vertices[i];
		let (x2, y2) = vertices[(i + 1) % n];
		let cross = (x2 - x1) * (lon - y1) - (y2 - y1) * (lat - x1);
		if cross != 0.0 {
			if sign == 0.0 {
				sign = cross.signum();
			} else if cross.signum() != sign {
				return false;
			}
		}
	}
	true
}

/// Why an `executeKNN` result stopped growing before reaching `k`
/// (spec.md §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
	ResultCapReached,
	RadiusSaturated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpatialCandidate {
	pub pk: Value,
	pub lat: f64,
	pub lon: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnnResult {
	pub results: Vec<(SpatialCandidate, f64)>,
	pub is_complete: bool,
	pub truncated_reason: Option<TruncationReason>,
}

fn value_to_element(v: &Value) -> Element {
	match v {
		Value::Null => Element::Null,
		Value::Bool(b) => Element::Bool(*b),
		Value::Int(i) => Element::Int(*i),
		Value::Float(f) => Element::Float(*f),
		Value::String(s) => Element::String(s.clone()),
		Value::Bytes(b) => Element::Bytes(b.clone()),
		Value::Tuple(t) => Element::Tuple(t.iter().map(value_to_element).collect()),
	}
}

fn element_to_value(e: &Element) -> Value {
	match e {
		Element::Null => Value::Null,
		Element::Bool(b) => Value::Bool(*b),
		Element::Int(i) => Value::Int(*i),
		Element::Float(f) => Value::Float(*f),
		Element::String(s) => Value::String(s.clone()),
		Element::Bytes(b) => Value::Bytes(b.clone()),
		Element::Tuple(t) => Value::Tuple(t.iter().map(element_to_value).collect()),
	}
}

/// Hard cap on the total number of candidates any single query returns,
/// independent of the caller's own `k`/limit (spec.md §4.I: "a hard result
/// cap").
const MAX_RESULT_CAP: usize = 10_000;

pub struct SpatialIndexMaintainer {
	name: String,
	subspace: Subspace,
	config: SpatialConfig,
	state: IndexStateMachine,
}

impl SpatialIndexMaintainer {
	pub fn new(name: impl Into<String>, subspace: Subspace, config: SpatialConfig) -> Self {
		Self { name: name.into(), subspace, config, state: IndexStateMachine::disabled() }
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn config(&self) -> SpatialConfig {
		self.config
	}

	pub fn state(&self) -> &IndexStateMachine {
		&self.state
	}

	fn encode_point(&self, lat: f64, lon: f64) -> u64 {
		encode(self.config.encoding, lat, lon, self.config.level)
	}

	fn cell_subspace(&self, cell: u64) -> Subspace {
		self.subspace.child(cell as i64)
	}

	fn entry_key(&self, cell: u64, pk: &Value) -> Vec<u8> {
		self.cell_subspace(cell).pack(&Tuple::new(vec![value_to_element(pk)]))
	}

	/// `updateIndex(old?, new?, txn)`.
	pub async fn update_index<T: Transaction>(
		&self,
		old: Option<(&Value, f64, f64)>,
		new: Option<(&Value, f64, f64)>,
		txn: &mut T,
	) -> Result<(), Error> {
		self.state.require_writable(&self.name)?;
		trace!(target: TARGET, index = %self.name, "update_index");

		if let Some((pk, lat, lon)) = old {
			let cell = self.encode_point(lat, lon);
			txn.del(self.entry_key(cell, pk)).await?;
		}
		if let Some((pk, lat, lon)) = new {
			let cell = self.encode_point(lat, lon);
			let value = crate::codec::pack(&Tuple::new(vec![Element::Float(lat), Element::Float(lon)]))?;
			txn.set(self.entry_key(cell, pk), value).await?;
		}
		Ok(())
	}

	async fn scan_cell<T: Transaction>(&self, cell: u64, txn: &mut T) -> Result<Vec<SpatialCandidate>, Error> {
		let sub = self.cell_subspace(cell);
		let (begin, end) = sub.range();
		let rows = txn.scan(begin..end, 0).await?;
		let mut out = Vec::with_capacity(rows.len());
		for (key, val) in rows {
			let tail = crate::codec::unpack(&key[sub.as_bytes().len()..])?;
			let pk = tail.0.first().map(element_to_value).ok_or_else(|| Error::codec("missing pk in spatial entry"))?;
			let point = crate::codec::unpack(&val)?;
			let (Some(Element::Float(lat)), Some(Element::Float(lon))) = (point.0.first(), point.0.get(1)) else {
				return Err(Error::codec("malformed spatial point value"));
			};
			out.push(SpatialCandidate { pk, lat: *lat, lon: *lon });
		}
		Ok(out)
	}

	/// Samples the cell grid covering `[min_lat, max_lat] x [min_lon,
	/// max_lon]`, deduplicated and capped at [`MAX_COVERING_CELLS`]
	/// (spec.md §4.I: "minimal covering set... bounded, deduplicated,
	/// count-limited to a safety cap").
	fn cover_bbox(&self, min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Vec<u64> {
		let level = clamp_level(self.config.level);
		let n = 1u64 << level;
		let step_lat = 180.0 / n as f64;
		let step_lon = 360.0 / n as f64;
		let mut cells = std::collections::BTreeSet::new();
		let mut lat = min_lat;
		'outer: loop {
			let mut lon = min_lon;
			loop {
				cells.insert(self.encode_point(lat.min(max_lat), lon.min(max_lon)));
				if cells.len() >= MAX_COVERING_CELLS {
					break 'outer;
				}
				if lon >= max_lon {
					break;
				}
				lon += step_lon;
			}
			if lat >= max_lat {
				break;
			}
			lat += step_lat;
		}
		cells.into_iter().collect()
	}

	/// `searchBoundingBox(minLat, minLon, maxLat, maxLon)`: unrefined
	/// candidates — the caller refines (spec.md §4.I).
	pub async fn search_bounding_box<T: Transaction>(
		&self,
		min_lat: f64,
		min_lon: f64,
		max_lat: f64,
		max_lon: f64,
		txn: &mut T,
	) -> Result<Vec<SpatialCandidate>, Error> {
		self.state.require_readable(&self.name)?;
		debug!(target: TARGET, index = %self.name, min_lat, min_lon, max_lat, max_lon, "search_bounding_box");
		let mut out = Vec::new();
		for cell in self.cover_bbox(min_lat, min_lon, max_lat, max_lon) {
			out.extend(self.scan_cell(cell, txn).await?);
			if out.len() >= MAX_RESULT_CAP {
				warn!(target: TARGET, index = %self.name, "search_bounding_box: result cap reached");
				out.truncate(MAX_RESULT_CAP);
				break;
			}
		}
		Ok(out)
	}

	/// `searchRadius(lat, lon, radiusMeters)`: covers the enclosing disk's
	/// bounding box, then refines by Haversine distance.
	pub async fn search_radius<T: Transaction>(
		&self,
		lat: f64,
		lon: f64,
		radius_meters: f64,
		txn: &mut T,
	) -> Result<Vec<(SpatialCandidate, f64)>, Error> {
		self.state.require_readable(&self.name)?;
		trace!(target: TARGET, index = %self.name, lat, lon, radius_meters, "search_radius");
		if !(radius_meters.is_finite() && radius_meters > 0.0) {
			return Err(Error::InvalidRadius(format!("radiusMeters must be finite and > 0, got {radius_meters}")));
		}
		let radius_km = radius_meters / 1000.0;
		let deg_lat = (radius_km / 111.0).min(90.0);
		let deg_lon = (radius_km / (111.0 * lat.to_radians().cos().abs().max(1e-6))).min(180.0);

		let mut out = Vec::new();
		for cell in self.cover_bbox(lat - deg_lat, lon - deg_lon, lat + deg_lat, lon + deg_lon) {
			for cand in self.scan_cell(cell, txn).await? {
				let dist_km = haversine_km(lat, lon, cand.lat, cand.lon);
				if dist_km * 1000.0 <= radius_meters {
					out.push((cand, dist_km));
				}
			}
			if out.len() >= MAX_RESULT_CAP {
				break;
			}
		}
		out.sort_by(|a, b| crate::value::total_cmp_f64(a.1, b.1));
		out.truncate(MAX_RESULT_CAP);
		Ok(out)
	}

	/// `searchPolygon(vertices, mode, validate)`.
	pub async fn search_polygon<T: Transaction>(
		&self,
		vertices: &[(f64, f64)],
		mode: PolygonMode,
		validate: bool,
		txn: &mut T,
	) -> Result<Vec<SpatialCandidate>, Error> {
		self.state.require_readable(&self.name)?;
		trace!(target: TARGET, index = %self.name, vertices = vertices.len(), ?mode, "search_polygon");
		if validate && vertices.len() < 3 {
			warn!(target: TARGET, index = %self.name, vertices = vertices.len(), "search_polygon: too few vertices");
			return Err(Error::InvalidPolygon(format!(
				"polygon requires at least 3 vertices, got {}",
				vertices.len()
			)));
		}
		let min_lat = vertices.iter().map(|v| v.0).fold(f64::INFINITY, f64::min);
		let max_lat = vertices.iter().map(|v| v.0).fold(f64::NEG_INFINITY, f64::max);
		let min_lon = vertices.iter().map(|v| v.1).fold(f64::INFINITY, f64::min);
		let max_lon = vertices.iter().map(|v| v.1).fold(f64::NEG_INFINITY, f64::max);

		let mut out = Vec::new();
		for cell in self.cover_bbox(min_lat, min_lon, max_lat, max_lon) {
			for cand in self.scan_cell(cell, txn).await? {
				let contained = match mode {
					PolygonMode::Simple => ray_cast_contains(vertices, cand.lat, cand.lon),
					PolygonMode::Convex => convex_contains(vertices, cand.lat, cand.lon),
				};
				if contained {
					out.push(cand);
				}
			}
			if out.len() >= MAX_RESULT_CAP {
				out.truncate(MAX_RESULT_CAP);
				break;
			}
		}
		Ok(out)
	}

	/// `executeKNN(lat, lon, k, initialRadiusKm, maxRadiusKm,
	/// expansionFactor)`: radial expansion until `k` results are found, the
	/// radius saturates at `maxRadiusKm`, or [`MAX_RESULT_CAP`] is hit.
	pub async fn execute_knn<T: Transaction>(
		&self,
		lat: f64,
		lon: f64,
		k: usize,
		initial_radius_km: f64,
		max_radius_km: f64,
		expansion_factor: f64,
		txn: &mut T,
	) -> Result<KnnResult, Error> {
		self.state.require_readable(&self.name)?;
		debug!(target: TARGET, index = %self.name, lat, lon, k, initial_radius_km, max_radius_km, "execute_knn");
		if k == 0 {
			return Err(Error::InvalidKnnParameters("k must be > 0".into()));
		}
		if !(initial_radius_km.is_finite() && initial_radius_km > 0.0) {
			return Err(Error::InvalidKnnParameters("initialRadiusKm must be finite and > 0".into()));
		}
		if !(max_radius_km.is_finite() && max_radius_km >= initial_radius_km) {
			return Err(Error::InvalidKnnParameters("maxRadiusKm must be finite and >= initialRadiusKm".into()));
		}
		if !(expansion_factor.is_finite() && expansion_factor > 1.0) {
			return Err(Error::InvalidKnnParameters("expansionFactor must be finite and > 1.0".into()));
		}

		let mut radius_km = initial_radius_km;
		let mut truncated_reason = Some(TruncationReason::RadiusSaturated);
		let mut results;
		loop {
			results = self.search_radius(lat, lon, radius_km * 1000.0, txn).await?;
			if results.len() >= k {
				truncated_reason = None;
				break;
			}
			if results.len() >= MAX_RESULT_CAP {
				truncated_reason = Some(TruncationReason::ResultCapReached);
				break;
			}
			if radius_km >= max_radius_km {
				break;
			}
			radius_km = (radius_km * expansion_factor).min(max_radius_km);
		}

		let is_complete = results.len() >= k;
		results.truncate(k);
		if !is_complete {
			warn!(target: TARGET, index = %self.name, ?truncated_reason, "execute_knn: incomplete");
		}
		Ok(KnnResult { results, is_complete, truncated_reason: if is_complete { None } else { truncated_reason } })
	}

	/// Validates and dispatches a wire-level query descriptor (spec.md
	/// §4.I: "a spatial query descriptor"), raising [`Error::NoConstraint`]
	/// when the selected variant's required constraint is absent.
	pub async fn execute_query<T: Transaction>(&self, query: SpatialQuery, txn: &mut T) -> Result<SpatialQueryResult, Error> {
		trace!(target: TARGET, index = %self.name, ?query, "execute_query");
		match query {
			SpatialQuery::BoundingBox { min_lat, min_lon, max_lat, max_lon } => {
				let (min_lat, min_lon, max_lat, max_lon) = match (min_lat, min_lon, max_lat, max_lon) {
					(Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
					_ => {
						warn!(target: TARGET, index = %self.name, "execute_query: bounding box missing a bound");
						return Err(Error::NoConstraint);
					}
				};
				let found = self.search_bounding_box(min_lat, min_lon, max_lat, max_lon, txn).await?;
				Ok(SpatialQueryResult::Candidates(found))
			}
			SpatialQuery::Radius { lat, lon, radius_meters } => {
				let Some(radius_meters) = radius_meters else {
					warn!(target: TARGET, index = %self.name, "execute_query: radius query missing radius");
					return Err(Error::NoConstraint);
				};
				let found = self.search_radius(lat, lon, radius_meters, txn).await?;
				Ok(SpatialQueryResult::Ranked(found))
			}
			SpatialQuery::Polygon { vertices, mode } => {
				if vertices.is_empty() {
					warn!(target: TARGET, index = %self.name, "execute_query: polygon query missing vertices");
					return Err(Error::NoConstraint);
				}
				let found = self.search_polygon(&vertices, mode, true, txn).await?;
				Ok(SpatialQueryResult::Candidates(found))
			}
			SpatialQuery::Knn { lat, lon, k, initial_radius_km, max_radius_km, expansion_factor } => {
				let Some(k) = k else {
					warn!(target: TARGET, index = %self.name, "execute_query: knn query missing k");
					return Err(Error::NoConstraint);
				};
				let found = self
					.execute_knn(
						lat,
						lon,
						k,
						initial_radius_km.unwrap_or(1.0),
						max_radius_km.unwrap_or(100.0),
						expansion_factor.unwrap_or(2.0),
						txn,
					)
					.await?;
				Ok(SpatialQueryResult::Knn(found))
			}
		}
	}
}

/// A wire-level spatial-query descriptor (spec.md §4.I). Optional fields
/// model a query that was parsed off the wire without its required
/// constraint; [`SpatialIndexMaintainer::execute_query`] rejects those with
/// [`Error::NoConstraint`] rather than silently defaulting them.
#[derive(Debug, Clone, PartialEq)]
pub enum SpatialQuery {
	BoundingBox { min_lat: Option<f64>, min_lon: Option<f64>, max_lat: Option<f64>, max_lon: Option<f64> },
	Radius { lat: f64, lon: f64, radius_meters: Option<f64> },
	Polygon { vertices: Vec<(f64, f64)>, mode: PolygonMode },
	Knn { lat: f64, lon: f64, k: Option<usize>, initial_radius_km: Option<f64>, max_radius_km: Option<f64>, expansion_factor: Option<f64> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpatialQueryResult {
	Candidates(Vec<SpatialCandidate>),
	Ranked(Vec<(SpatialCandidate, f64)>),
	Knn(KnnResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
	Simple,
	Convex,
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::kvs::{Datastore, MemoryDatastore};
	use crate::subspace::Directory;

	fn maintainer(encoding: Encoding) -> SpatialIndexMaintainer {
		let dir = Directory::new();
		let m = SpatialIndexMaintainer::new("poi", dir.resolve(&["poi"]), SpatialConfig { encoding, level: 12 });
		m.state().enable().unwrap();
		m.state().make_readable().unwrap();
		m
	}

	#[test]
	fn encode_is_a_pure_function_of_the_point() {
		let a = encode_s2(37.7749, -122.4194, 12);
		let b = encode_s2(37.7749, -122.4194, 12);
		assert_eq!(a, b);
		let c = encode_morton(37.7749, -122.4194, 12);
		let d = encode_morton(37.7749, -122.4194, 12);
		assert_eq!(c, d);
	}

	#[tokio::test]
	async fn radius_search_finds_nearby_and_excludes_far_points() {
		let m = maintainer(Encoding::Morton);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some((&Value::from("near"), 37.7750, -122.4195)), &mut tx).await.unwrap();
		m.update_index(None, Some((&Value::from("far"), 51.5074, -0.1278)), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let found = m.search_radius(37.7749, -122.4194, 1000.0, &mut tx).await.unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].0.pk, Value::from("near"));
	}

	#[tokio::test]
	async fn polygon_search_validates_minimum_vertex_count() {
		let m = maintainer(Encoding::S2);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(false).await.unwrap();
		let err = m.search_polygon(&[(0.0, 0.0), (1.0, 1.0)], PolygonMode::Simple, true, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::InvalidPolygon(_)));
	}

	#[tokio::test]
	async fn knn_expands_radius_until_k_satisfied() {
		let m = maintainer(Encoding::Morton);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some((&Value::from("a"), 0.0, 0.0)), &mut tx).await.unwrap();
		m.update_index(None, Some((&Value::from("b"), 0.01, 0.01)), &mut tx).await.unwrap();
		m.update_index(None, Some((&Value::from("c"), 10.0, 10.0)), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let res = m.execute_knn(0.0, 0.0, 2, 0.1, 2000.0, 2.0, &mut tx).await.unwrap();
		assert!(res.is_complete);
		assert_eq!(res.results.len(), 2);
		assert!(res.results[0].1 <= res.results[1].1, "results must be distance-ordered");
	}

	#[tokio::test]
	async fn knn_reports_incomplete_when_radius_saturates() {
		let m = maintainer(Encoding::Morton);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(true).await.unwrap();
		m.update_index(None, Some((&Value::from("a"), 0.0, 0.0)), &mut tx).await.unwrap();
		tx.commit().await.unwrap();

		let mut tx = ds.transaction(false).await.unwrap();
		let res = m.execute_knn(0.0, 0.0, 5, 0.01, 0.02, 1.5, &mut tx).await.unwrap();
		assert!(!res.is_complete);
		assert_eq!(res.truncated_reason, Some(TruncationReason::RadiusSaturated));
	}

	#[test]
	fn p9_decode_of_encode_round_trips_morton() {
		let level = 14;
		let (lat, lon) = (10.0, 10.0);
		let k = encode_morton(lat, lon, level);
		let (dec_lat, dec_lon) = decode_morton(k, level);
		let k2 = encode_morton(dec_lat, dec_lon, level);
		assert_eq!(k, k2, "encode(decode(k)) must be idempotent");

		let n = 1u64 << level;
		let step_lat = 180.0 / n as f64;
		let step_lon = 360.0 / n as f64;
		assert!((dec_lat - lat).abs() <= step_lat, "decode(encode(p)) must lie in the cell claimed by k");
		assert!((dec_lon - lon).abs() <= step_lon);
	}

	#[test]
	fn p9_decode_of_encode_round_trips_s2() {
		let level = 14;
		let (lat, lon) = (10.0, 10.0);
		let k = encode_s2(lat, lon, level);
		let (dec_lat, dec_lon) = decode_s2(k);
		let k2 = encode_s2(dec_lat, dec_lon, level);
		assert_eq!(k, k2, "encode(decode(k)) must be idempotent");
	}

	#[tokio::test]
	async fn execute_query_rejects_missing_constraints() {
		let m = maintainer(Encoding::Morton);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(false).await.unwrap();

		let err = m
			.execute_query(SpatialQuery::BoundingBox { min_lat: Some(0.0), min_lon: None, max_lat: Some(1.0), max_lon: Some(1.0) }, &mut tx)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::NoConstraint));

		let err = m.execute_query(SpatialQuery::Radius { lat: 0.0, lon: 0.0, radius_meters: None }, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::NoConstraint));

		let err =
			m.execute_query(SpatialQuery::Polygon { vertices: vec![], mode: PolygonMode::Simple }, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::NoConstraint));

		let err = m
			.execute_query(
				SpatialQuery::Knn { lat: 0.0, lon: 0.0, k: None, initial_radius_km: None, max_radius_km: None, expansion_factor: None },
				&mut tx,
			)
			.await
			.unwrap_err();
		assert!(matches!(err, Error::NoConstraint));
	}

	#[tokio::test]
	async fn invalid_knn_parameters_are_rejected() {
		let m = maintainer(Encoding::Morton);
		let ds = MemoryDatastore::new();
		let mut tx = ds.transaction(false).await.unwrap();
		let err = m.execute_knn(0.0, 0.0, 0, 1.0, 2.0, 1.5, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::InvalidKnnParameters(_)));
		let err = m.execute_knn(0.0, 0.0, 1, 1.0, 0.5, 1.5, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::InvalidKnnParameters(_)));
		let err = m.execute_knn(0.0, 0.0, 1, 1.0, 2.0, 1.0, &mut tx).await.unwrap_err();
		assert!(matches!(err, Error::InvalidKnnParameters(_)));
	}
}
