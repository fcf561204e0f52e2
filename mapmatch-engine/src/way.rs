//! Way → directed `Segment` decomposition and tag extraction.
//!
//! Handles oneway-tag parsing (`"yes"|"1"|"true"`, motorway-implies-oneway,
//! `"-1"|"reverse"`) and directed/bidirectional segment construction.

use std::collections::HashMap;

use mapmatch_common::{geodesy, Error, LonLat, NodeId, WayId};

/// An OSM way: immutable identifier, ordered node list, and tags.
#[derive(Debug, Clone)]
pub struct Way {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
    pub tags: HashMap<String, String>,
}

const MOTORWAY_HIGHWAYS: [&str; 2] = ["motorway", "motorway_link"];

impl Way {
    /// True if the tag is `yes`/`1`/`true`/`-1`/`reverse`, or unset and the
    /// highway type implies oneway (motorway family).
    pub fn is_oneway(&self) -> bool {
        match self.tags.get("oneway").map(String::as_str) {
            Some("yes") | Some("1") | Some("true") => true,
            Some("-1") | Some("reverse") => true,
            _ => self
                .tags
                .get("highway")
                .map(|h| MOTORWAY_HIGHWAYS.contains(&h.as_str()))
                .unwrap_or(false),
        }
    }

    /// True if the way is one-way in the direction opposite its stored node order.
    pub fn oneway_reversed(&self) -> bool {
        matches!(self.tags.get("oneway").map(String::as_str), Some("-1") | Some("reverse"))
    }

    pub fn highway(&self) -> Option<&str> {
        self.tags.get("highway").map(String::as_str)
    }
}

/// A directed adjacent-node pair inside a way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub way_id: WayId,
    pub segment_index: usize,
    pub node1: NodeId,
    pub node2: NodeId,
    /// `+1` if `node1 -> node2` matches the way's raw stored node order,
    /// `-1` otherwise.
    pub direction: i8,
    pub p1: LonLat,
    pub p2: LonLat,
    pub distance_m: f64,
    /// Forward bearing `p1 -> p2`, degrees.
    pub bearing_deg: f64,
}

impl Segment {
    fn new(
        way_id: WayId,
        segment_index: usize,
        node1: NodeId,
        node2: NodeId,
        direction: i8,
        p1: LonLat,
        p2: LonLat,
    ) -> Self {
        Segment {
            way_id,
            segment_index,
            node1,
            node2,
            direction,
            p1,
            p2,
            distance_m: geodesy::distance(p1, p2),
            bearing_deg: geodesy::bearing(p1, p2),
        }
    }
}

/// Builds the directed segments of `way`, sliding a window of 2 nodes over
/// its node list. `node_coords` must contain every node `way`
/// references; a miss is an `Error::Internal` (contradicted invariant).
pub fn build_segments(way: &Way, node_coords: &HashMap<NodeId, LonLat>) -> Result<Vec<Segment>, Error> {
    let lookup = |n: NodeId| -> Result<LonLat, Error> {
        node_coords
            .get(&n)
            .copied()
            .ok_or_else(|| Error::internal(format!("way {} references unknown node {}", way.id, n)))
    };

    let oneway = way.is_oneway();
    let reversed = way.oneway_reversed();
    let mut segments = Vec::with_capacity(way.nodes.len().saturating_sub(1) * if oneway { 1 } else { 2 });

    for (idx, pair) in way.nodes.windows(2).enumerate() {
        let (raw_a, raw_b) = (pair[0], pair[1]);
        let pa = lookup(raw_a)?;
        let pb = lookup(raw_b)?;

        if !oneway {
            segments.push(Segment::new(way.id, idx, raw_a, raw_b, 1, pa, pb));
            segments.push(Segment::new(way.id, idx, raw_b, raw_a, -1, pb, pa));
        } else if reversed {
            // Allowed travel is node2 -> node1 in storage order; emit the
            // single segment with node1/node2 swapped so direction stays +1.
            segments.push(Segment::new(way.id, idx, raw_b, raw_a, 1, pb, pa));
        } else {
            segments.push(Segment::new(way.id, idx, raw_a, raw_b, 1, pa, pb));
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(tags: &[(&str, &str)], nodes: &[i64]) -> Way {
        Way {
            id: WayId(1),
            nodes: nodes.iter().map(|&n| NodeId(n)).collect(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    fn coords() -> HashMap<NodeId, LonLat> {
        [
            (NodeId(1), LonLat::new(0.0, 0.0)),
            (NodeId(2), LonLat::new(0.001, 0.0)),
            (NodeId(3), LonLat::new(0.002, 0.0)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn bidirectional_way_emits_two_segments_per_pair() {
        let w = way(&[("highway", "residential")], &[1, 2, 3]);
        let segs = build_segments(&w, &coords()).unwrap();
        assert_eq!(segs.len(), 4);
    }

    #[test]
    fn oneway_yes_emits_one_segment_per_pair_matching_stored_order() {
        let w = way(&[("highway", "residential"), ("oneway", "yes")], &[1, 2, 3]);
        let segs = build_segments(&w, &coords()).unwrap();
        assert_eq!(segs.len(), 2);
        assert!(segs.iter().all(|s| s.direction == 1));
        assert_eq!(segs[0].node1, NodeId(1));
        assert_eq!(segs[0].node2, NodeId(2));
    }

    #[test]
    fn motorway_implies_oneway_even_without_explicit_tag() {
        let w = way(&[("highway", "motorway")], &[1, 2]);
        let segs = build_segments(&w, &coords()).unwrap();
        assert_eq!(segs.len(), 1);
    }

    #[test]
    fn oneway_reverse_swaps_node_order_but_keeps_direction_positive() {
        let w = way(&[("highway", "residential"), ("oneway", "-1")], &[1, 2]);
        let segs = build_segments(&w, &coords()).unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].direction, 1);
        assert_eq!(segs[0].node1, NodeId(2));
        assert_eq!(segs[0].node2, NodeId(1));
    }

    #[test]
    fn reverse_direction_bearing_is_forward_bearing_plus_180() {
        let w = way(&[("highway", "residential")], &[1, 2]);
        let segs = build_segments(&w, &coords()).unwrap();
        let fwd = segs.iter().find(|s| s.direction == 1).unwrap();
        let rev = segs.iter().find(|s| s.direction == -1).unwrap();
        let expected = (fwd.bearing_deg + 180.0) % 360.0;
        assert!((rev.bearing_deg - expected).abs() < 1e-6);
    }

    #[test]
    fn unknown_node_reference_is_an_internal_error() {
        let w = way(&[("highway", "residential")], &[1, 99]);
        let err = build_segments(&w, &coords()).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }
}
