//! Candidate search: fetches nearby ways, decomposes them into segments, and
//! projects each conditioned point onto every segment within a radius.
//!
//! An in-memory R-tree over segment midpoints gives a broad-phase spatial
//! prefilter; the exact `xte`/`alongtrack` check still runs on every segment
//! the R-tree returns, so the prefilter only needs to be generous, never
//! exact.

use std::collections::HashMap;

use mapmatch_common::{geodesy, Error, LonLat, NodeId};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::condition::ConditionedPoint;
use crate::config::Config;
use crate::gateway::{CachedGateway, GatewayPool};
use crate::way::{self, Segment};

/// A possibly-matched `(segment, projection)` pair for one observation.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    pub segment: Segment,
    pub alongtrack: f64,
    pub xte: f64,
    pub projected_point: LonLat,
}

const METERS_PER_DEG_LAT: f64 = 111_000.0;

/// A segment's midpoint, indexed for the broad-phase radius prefilter.
#[derive(Clone, Copy)]
struct IndexedSegment {
    coords: [f64; 2],
    segment: Segment,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.coords[0] - point[0];
        let dy = self.coords[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Enumerates directed segment candidates for one conditioned point within
/// `cfg.searchradius`. Returns an empty vec for a gap (the
/// caller decides what a gap means for the lattice).
#[tracing::instrument(skip_all, fields(lon = point.lon, lat = point.lat))]
pub fn search_candidates(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    point: &ConditionedPoint,
    cfg: &Config,
) -> Result<Vec<Candidate>, Error> {
    let way_ids = gateway.ways_near(point.lon, point.lat, cfg.searchradius)?;
    let mut all_segments = Vec::new();

    for way_id in way_ids {
        let way = gateway.way_nodes(way_id)?;

        let node_results = gateway.nodes_batch(pool, &way.nodes);
        let mut node_coords: HashMap<NodeId, LonLat> = HashMap::with_capacity(way.nodes.len());
        for (&node_id, result) in way.nodes.iter().zip(node_results) {
            let (coord, _tags) = result?;
            node_coords.insert(node_id, coord);
        }

        all_segments.extend(way::build_segments(&way, &node_coords)?);
    }

    // Meters-per-degree-longitude shrinks with latitude; using the latitude
    // term for both axes over-estimates the lon buffer near the equator and
    // under-estimates it at high latitude, so pad generously — the exact
    // `along_and_cross_track` check below is what actually decides inclusion.
    let meters_per_deg_lon = METERS_PER_DEG_LAT * point.lat.to_radians().cos().abs().max(0.1);
    let radius_deg = cfg.searchradius / meters_per_deg_lon * 1.5;

    let tree = RTree::bulk_load(
        all_segments
            .iter()
            .map(|segment| IndexedSegment {
                coords: [(segment.p1.lon + segment.p2.lon) / 2.0, (segment.p1.lat + segment.p2.lat) / 2.0],
                segment: *segment,
            })
            .collect(),
    );

    let query = [point.lon, point.lat];
    let mut candidates = Vec::new();
    for indexed in tree.locate_within_distance(query, radius_deg * radius_deg) {
        let segment = indexed.segment;
        let (along, xte) = geodesy::along_and_cross_track(segment.p1, segment.p2, point.coord());
        if xte > cfg.searchradius {
            continue;
        }
        let alongtrack = along.clamp(0.0, segment.distance_m);
        let projected_point = geodesy::project_on_segment(segment.p1, segment.p2, point.coord());
        candidates.push(Candidate { segment, alongtrack, xte, projected_point });
    }

    if candidates.is_empty() {
        tracing::debug!(observation_index = point.original_index, reason = "gap", "no candidates within searchradius");
    }

    Ok(candidates)
}
