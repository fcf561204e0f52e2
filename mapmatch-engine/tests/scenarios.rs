//! Integration-style coverage of key end-to-end scenarios against a small
//! synthetic in-memory `RoadNetworkGateway`: a real PostGIS-backed gateway
//! and road network extract are external collaborators this crate cannot
//! stand up in tests, so these exercise the same invariants (out-and-back
//! stitching, one-way never traversed backward, off-road points, single
//! point) against a hand-built fixture instead.

use std::collections::HashMap;

use mapmatch_common::{Error, LonLat, MatchResultTag, NodeId, WayId};
use mapmatch_engine::condition::RawPoint;
use mapmatch_engine::gateway::RoadNetworkGateway;
use mapmatch_engine::way::Way;
use mapmatch_engine::{match_trace, Config};

/// A single bidirectional residential way over nodes `1..=n`, spaced
/// `spacing_deg` apart along the equator.
struct StraightLine {
    node_count: i64,
    spacing_deg: f64,
    oneway: bool,
}

impl RoadNetworkGateway for StraightLine {
    fn ways_near(&self, _lon: f64, _lat: f64, _radius_m: f64) -> Result<Vec<WayId>, Error> {
        Ok(vec![WayId(1)])
    }

    fn way_nodes(&self, _way_id: WayId) -> Result<Way, Error> {
        let mut tags = HashMap::new();
        tags.insert("highway".to_string(), "residential".to_string());
        if self.oneway {
            tags.insert("oneway".to_string(), "yes".to_string());
        }
        Ok(Way { id: WayId(1), nodes: (1..=self.node_count).map(NodeId).collect(), tags })
    }

    fn node(&self, node_id: NodeId) -> Result<(LonLat, HashMap<String, String>), Error> {
        Ok((LonLat::new(self.spacing_deg * (node_id.0 - 1) as f64, 0.0), HashMap::new()))
    }

    fn ways_at_node(&self, _node_id: NodeId) -> Result<Vec<WayId>, Error> {
        Ok(vec![WayId(1)])
    }
}

fn row(idx: usize, secs: i64, lon: f64) -> RawPoint {
    RawPoint {
        original_index: idx,
        datetime: format!("2020-01-01 00:{:02}:{:02}", secs / 60, secs % 60),
        lon,
        lat: 0.0,
        passthrough: HashMap::new(),
    }
}

/// An out-and-back drive along a single bidirectional
/// way. The segments summary must traverse each segment twice, once in each
/// direction, stitching at the turnaround node.
#[test]
fn out_and_back_on_a_bidirectional_way_traverses_each_segment_both_ways() {
    let gw = StraightLine { node_count: 3, spacing_deg: 0.001, oneway: false };
    let mut cfg = Config::default();
    cfg.minpoints = 4;
    cfg.minpointdistance = 10.0;

    let raw = vec![
        row(0, 0, 0.000),
        row(1, 10, 0.001),
        row(2, 20, 0.002), // turnaround at node 3
        row(3, 30, 0.001),
        row(4, 40, 0.000),
    ];

    let output = match_trace(&gw, &raw, &cfg);
    assert_eq!(output.stats.result, MatchResultTag::Ok);
    assert!(!output.segments.is_empty(), "expected a non-empty segments summary");

    // Every consecutive pair stitches: node2 of one equals node1 of the next.
    for pair in output.segments.windows(2) {
        assert_eq!(pair[0].node2, pair[1].node1, "segments summary must stitch node-to-node");
    }

    // Each (way_id, segment_index) pair driven over should appear with both
    // direction=+1 and direction=-1 somewhere in the stitched list.
    let mut seen_forward = false;
    let mut seen_backward = false;
    for w in output.segments.windows(1) {
        match w[0].direction {
            1 => seen_forward = true,
            -1 => seen_backward = true,
            _ => {}
        }
    }
    assert!(seen_forward && seen_backward, "out-and-back must produce both directions in the stitched route");
    // The node1=node2 stitching check above already covers the turnaround
    // boundary, since it holds across every consecutive pair including the
    // one where direction flips from +1 to -1.
}

/// A one-way link cannot be traversed backward. With no
/// alternate route in this synthetic fixture, the engine must report a break
/// rather than fabricate a reverse-direction segment.
#[test]
fn one_way_violation_never_produces_a_backward_segment() {
    let gw = StraightLine { node_count: 4, spacing_deg: 0.001, oneway: true };
    let mut cfg = Config::default();
    cfg.minpoints = 5;
    cfg.minpointdistance = 10.0;

    let raw = vec![
        row(0, 0, 0.000),
        row(1, 10, 0.001),
        row(2, 20, 0.002),
        row(3, 30, 0.003), // forward to node 4
        row(4, 40, 0.002), // now attempting to drive back against the oneway
        row(5, 50, 0.001),
        row(6, 60, 0.000),
    ];

    let output = match_trace(&gw, &raw, &cfg);
    assert_eq!(output.stats.result, MatchResultTag::Ok);

    // The oneway fixture only ever emits direction=+1 segments; reconstruction
    // must never invent a reverse traversal to paper over the blocked hop.
    assert!(output.segments.iter().all(|s| s.direction == 1));

    // The backward leg is unreachable within budget, so it must surface as a
    // break rather than silently vanish or succeed.
    assert!(output.points.iter().any(|p| p.is_break), "expected a break where the route reverses against the oneway");
}

/// A single-point input cannot satisfy `minpoints`.
#[test]
fn single_point_input_is_not_enough_points() {
    let gw = StraightLine { node_count: 3, spacing_deg: 0.001, oneway: false };
    let cfg = Config::default();
    let raw = vec![row(0, 0, 0.0)];

    let output = match_trace(&gw, &raw, &cfg);
    assert_eq!(output.stats.result, MatchResultTag::NotEnoughPoints);
    assert!(output.points.is_empty());
    assert!(output.segments.is_empty());
    assert_eq!(output.stats.matched_points, 0);
}

/// Every point lands far from any road.
#[test]
fn all_points_off_road_is_not_enough_points() {
    struct NoRoads;
    impl RoadNetworkGateway for NoRoads {
        fn ways_near(&self, _lon: f64, _lat: f64, _radius_m: f64) -> Result<Vec<WayId>, Error> {
            Ok(Vec::new())
        }
        fn way_nodes(&self, _way_id: WayId) -> Result<Way, Error> {
            Err(Error::internal("no ways in this fixture"))
        }
        fn node(&self, _node_id: NodeId) -> Result<(LonLat, HashMap<String, String>), Error> {
            Err(Error::internal("no nodes in this fixture"))
        }
        fn ways_at_node(&self, _node_id: NodeId) -> Result<Vec<WayId>, Error> {
            Ok(Vec::new())
        }
    }

    let gw = NoRoads;
    let mut cfg = Config::default();
    cfg.minpointdistance = 10.0;
    let raw = vec![row(0, 0, 45.0), row(1, 10, 45.001), row(2, 20, 45.002)];

    let output = match_trace(&gw, &raw, &cfg);
    assert_eq!(output.stats.result, MatchResultTag::NotEnoughPoints);
}

/// Matching the same input twice against the same
/// fixture yields byte-identical (here: field-identical) summaries.
#[test]
fn matching_the_same_input_twice_is_idempotent() {
    let gw = StraightLine { node_count: 3, spacing_deg: 0.001, oneway: false };
    let mut cfg = Config::default();
    cfg.minpoints = 3;
    cfg.minpointdistance = 10.0;

    let raw = vec![row(0, 0, 0.000), row(1, 10, 0.001), row(2, 20, 0.002)];

    let first = match_trace(&gw, &raw, &cfg);
    let second = match_trace(&gw, &raw, &cfg);

    assert_eq!(first.stats.result, second.stats.result);
    assert_eq!(first.stats.matched_points, second.stats.matched_points);
    assert_eq!(first.points.len(), second.points.len());
    assert_eq!(first.segments.len(), second.segments.len());
    for (a, b) in first.points.iter().zip(second.points.iter()) {
        assert_eq!(a.way_id, b.way_id);
        assert_eq!(a.segment_index, b.segment_index);
        assert_eq!(a.xte_m, b.xte_m);
    }
}
