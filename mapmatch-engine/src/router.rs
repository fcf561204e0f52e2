//! A* shortest-path router with directed sub-segment handling.
//!
//! Priority-queue/parent-pointer A* over the directed segment graph, with
//! costs as `f64` meters via a small total-order `Ord` wrapper around the
//! binary heap. Sub-segment entry/exit arithmetic composes the partial
//! along-track distance on the entry and exit segments with the full-segment
//! graph search between their endpoints.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use mapmatch_common::{geodesy, Error, LonLat, NodeId};

use crate::candidate::Candidate;
use crate::config::Config;
use crate::gateway::{CachedGateway, GatewayPool};
use crate::way::{self, Segment};

#[derive(Debug, Clone, Copy)]
struct AStarState {
    f: f64,
    g: f64,
    node: NodeId,
}

impl PartialEq for AStarState {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.f == other.f
    }
}
impl Eq for AStarState {}

impl PartialOrd for AStarState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AStarState {
    /// Reversed so `BinaryHeap` (a max-heap) pops the smallest `f` first;
    /// ties broken by ascending node id.
    fn cmp(&self, other: &Self) -> Ordering {
        other.f.total_cmp(&self.f).then_with(|| other.node.cmp(&self.node))
    }
}

/// The directed graph's out-edges from `u`, with the specific [`Segment`]
/// each edge was derived from (needed to reconstruct a route's segment list).
fn neighbor_segments(gateway: &CachedGateway, pool: &GatewayPool, u: NodeId) -> Result<Vec<(NodeId, f64, Segment)>, Error> {
    let way_ids = gateway.ways_at_node(u)?;
    let mut out = Vec::new();

    for way_id in way_ids {
        let road_way = gateway.way_nodes(way_id)?;
        let node_results = gateway.nodes_batch(pool, &road_way.nodes);
        let mut coords: HashMap<NodeId, LonLat> = HashMap::with_capacity(road_way.nodes.len());
        for (&node_id, result) in road_way.nodes.iter().zip(node_results) {
            let (coord, _tags) = result?;
            coords.insert(node_id, coord);
        }

        for segment in way::build_segments(&road_way, &coords)? {
            if segment.node1 == u {
                out.push((segment.node2, segment.distance_m, segment));
            }
        }
    }

    Ok(out)
}

/// Graph-shortest-path from `start` to `goal`, with the segment chain taken.
/// `None` if unreachable within `budget` accumulated cost.
fn astar_with_path(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    start: NodeId,
    goal: NodeId,
    goal_coord: LonLat,
    budget: f64,
) -> Result<Option<(f64, Vec<Segment>)>, Error> {
    if start == goal {
        return Ok(Some((0.0, vec![])));
    }
    if budget < 0.0 {
        return Ok(None);
    }

    let (start_coord, _) = gateway.node(start)?;
    let h0 = geodesy::distance(start_coord, goal_coord);
    if h0 > budget {
        return Ok(None);
    }

    let mut best_g: HashMap<NodeId, f64> = HashMap::new();
    let mut parent: HashMap<NodeId, (NodeId, Segment)> = HashMap::new();
    best_g.insert(start, 0.0);
    let mut open = BinaryHeap::new();
    open.push(AStarState { f: h0, g: 0.0, node: start });

    while let Some(AStarState { f, g, node }) = open.pop() {
        if node == goal {
            let mut segments = Vec::new();
            let mut cur = goal;
            while let Some(&(prev, seg)) = parent.get(&cur) {
                segments.push(seg);
                cur = prev;
            }
            segments.reverse();
            return Ok(Some((g, segments)));
        }
        if f > budget {
            continue;
        }
        if let Some(&best) = best_g.get(&node) {
            if g > best {
                continue;
            }
        }

        for (next, edge_cost, segment) in neighbor_segments(gateway, pool, node)? {
            let candidate_g = g + edge_cost;
            if candidate_g > budget {
                continue;
            }
            let improves = best_g.get(&next).map(|&existing| candidate_g < existing).unwrap_or(true);
            if improves {
                best_g.insert(next, candidate_g);
                parent.insert(next, (node, segment));
                let (next_coord, _) = gateway.node(next)?;
                let h = geodesy::distance(next_coord, goal_coord);
                open.push(AStarState { f: candidate_g + h, g: candidate_g, node: next });
            }
        }
    }

    Ok(None)
}

/// A route between two candidates, with the full segment chain traversed.
#[derive(Debug, Clone)]
pub struct RouteDetail {
    pub cost_m: f64,
    pub path_segments: Vec<Segment>,
}

fn budget_for(cfg: &Config, dt_secs: f64) -> f64 {
    cfg.maxvel * dt_secs.max(0.0) * cfg.router_safety_factor
}

/// Full routing detail from `from.projected_point` to `to.projected_point`,
/// including the segment chain.
#[tracing::instrument(skip_all)]
pub fn route_detailed(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    from: &Candidate,
    to: &Candidate,
    cfg: &Config,
    dt_secs: f64,
) -> Result<Option<RouteDetail>, Error> {
    let budget = budget_for(cfg, dt_secs);

    let same_segment = from.segment.way_id == to.segment.way_id
        && from.segment.segment_index == to.segment.segment_index
        && from.segment.direction == to.segment.direction;

    if same_segment {
        let diff = to.alongtrack - from.alongtrack;
        if diff >= 0.0 {
            if diff > budget {
                tracing::debug!(cost = diff, budget, "router cutoff: sub-segment hop exceeds budget");
                return Ok(None);
            }
            let mut segment = from.segment;
            if diff == 0.0 {
                // c_k and c_k+1 project to the same point on the segment: no
                // direction of travel to report.
                segment.direction = 0;
            }
            return Ok(Some(RouteDetail { cost_m: diff, path_segments: vec![segment] }));
        }
    }

    let exit_remaining = from.segment.distance_m - from.alongtrack;
    let entry_consumed = to.alongtrack;
    let sub_segment_cost = exit_remaining + entry_consumed;
    if sub_segment_cost > budget {
        tracing::debug!(cost = sub_segment_cost, budget, "router cutoff: exit/entry cost alone exceeds budget");
        return Ok(None);
    }

    let exit_node = from.segment.node2;
    let entry_node = to.segment.node1;
    let (entry_coord, _) = gateway.node(entry_node)?;

    let remaining_budget = budget - sub_segment_cost;
    let (graph_cost, mid_segments) = match astar_with_path(gateway, pool, exit_node, entry_node, entry_coord, remaining_budget)? {
        Some(v) => v,
        None => {
            tracing::debug!(exit_node = exit_node.0, entry_node = entry_node.0, budget, "router cutoff: no reachable path within budget");
            return Ok(None);
        }
    };

    let mut path_segments = Vec::with_capacity(mid_segments.len() + 2);
    path_segments.push(from.segment);
    path_segments.extend(mid_segments);
    path_segments.push(to.segment);

    Ok(Some(RouteDetail { cost_m: sub_segment_cost + graph_cost, path_segments }))
}

/// Driving distance only, for the decoder's hot path.
pub fn route(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    from: &Candidate,
    to: &Candidate,
    cfg: &Config,
    dt_secs: f64,
) -> Result<Option<f64>, Error> {
    Ok(route_detailed(gateway, pool, from, to, cfg, dt_secs)?.map(|d| d.cost_m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::way::Way;
    use mapmatch_common::WayId;

    /// A three-node, two-way path: 1 -(100m)- 2 -(100m)- 3.
    struct LineGateway {
        oneway: bool,
    }

    impl crate::gateway::RoadNetworkGateway for LineGateway {
        fn ways_near(&self, _lon: f64, _lat: f64, _radius_m: f64) -> Result<Vec<WayId>, Error> {
            Ok(vec![WayId(1)])
        }

        fn way_nodes(&self, _way_id: WayId) -> Result<Way, Error> {
            let mut tags = HashMap::new();
            if self.oneway {
                tags.insert("oneway".to_string(), "yes".to_string());
            }
            Ok(Way { id: WayId(1), nodes: vec![NodeId(1), NodeId(2), NodeId(3)], tags })
        }

        fn node(&self, node_id: NodeId) -> Result<(LonLat, HashMap<String, String>), Error> {
            let lon = 0.001 * (node_id.0 - 1) as f64;
            Ok((LonLat::new(lon, 0.0), HashMap::new()))
        }

        fn ways_at_node(&self, _node_id: NodeId) -> Result<Vec<WayId>, Error> {
            Ok(vec![WayId(1)])
        }
    }

    fn segment_candidate(way_id: WayId, segment_index: usize, node1: i64, node2: i64, direction: i8, p1: LonLat, p2: LonLat, alongtrack: f64) -> Candidate {
        let distance_m = geodesy::distance(p1, p2);
        Candidate {
            segment: Segment { way_id, segment_index, node1: NodeId(node1), node2: NodeId(node2), direction, p1, p2, distance_m, bearing_deg: geodesy::bearing(p1, p2) },
            alongtrack,
            xte: 0.0,
            projected_point: p1,
        }
    }

    #[test]
    fn coincident_candidates_on_the_same_segment_emit_direction_zero() {
        let gw = LineGateway { oneway: false };
        let cached = CachedGateway::new(&gw);
        let pool = GatewayPool::new(2).unwrap();
        let cfg = Config::default();

        let p1 = LonLat::new(0.0, 0.0);
        let p2 = LonLat::new(0.001, 0.0);
        let from = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 30.0);
        let to = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 30.0);

        let detail = route_detailed(&cached, &pool, &from, &to, &cfg, 10.0).unwrap().unwrap();
        assert_eq!(detail.cost_m, 0.0);
        assert_eq!(detail.path_segments.len(), 1);
        assert_eq!(detail.path_segments[0].direction, 0);
    }

    #[test]
    fn same_segment_forward_hop_is_alongtrack_difference() {
        let gw = LineGateway { oneway: false };
        let cached = CachedGateway::new(&gw);
        let pool = GatewayPool::new(2).unwrap();
        let cfg = Config::default();

        let p1 = LonLat::new(0.0, 0.0);
        let p2 = LonLat::new(0.001, 0.0);
        let from = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 10.0);
        let to = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 60.0);

        let cost = route(&cached, &pool, &from, &to, &cfg, 10.0).unwrap();
        assert!((cost.unwrap() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn cross_segment_route_sums_exit_graph_entry() {
        let gw = LineGateway { oneway: false };
        let cached = CachedGateway::new(&gw);
        let pool = GatewayPool::new(2).unwrap();
        let cfg = Config::default();

        let p1 = LonLat::new(0.0, 0.0);
        let p2 = LonLat::new(0.001, 0.0);
        let p3 = LonLat::new(0.002, 0.0);
        let seg01_dist = geodesy::distance(p1, p2);

        let from = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, seg01_dist - 5.0);
        let to = segment_candidate(WayId(1), 1, 2, 3, 1, p2, p3, 5.0);

        let detail = route_detailed(&cached, &pool, &from, &to, &cfg, 100.0).unwrap().unwrap();
        assert!((detail.cost_m - 10.0).abs() < 1e-6);
        assert_eq!(detail.path_segments.len(), 2);
    }

    #[test]
    fn oneway_blocks_reverse_traversal() {
        let gw = LineGateway { oneway: true };
        let cached = CachedGateway::new(&gw);
        let pool = GatewayPool::new(2).unwrap();
        let cfg = Config::default();

        let p1 = LonLat::new(0.0, 0.0);
        let p2 = LonLat::new(0.001, 0.0);
        let p3 = LonLat::new(0.002, 0.0);

        // Travel attempted node3 -> node1, against the oneway direction.
        let from = segment_candidate(WayId(1), 1, 2, 3, 1, p2, p3, 50.0);
        let to = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 50.0);

        let cost = route(&cached, &pool, &from, &to, &cfg, 100.0).unwrap();
        assert!(cost.is_none());
    }

    #[test]
    fn budget_cutoff_yields_none_for_distant_pair() {
        let gw = LineGateway { oneway: false };
        let cached = CachedGateway::new(&gw);
        let pool = GatewayPool::new(2).unwrap();
        let mut cfg = Config::default();
        cfg.maxvel = 1.0;
        cfg.router_safety_factor = 1.0;

        let p1 = LonLat::new(0.0, 0.0);
        let p2 = LonLat::new(0.001, 0.0);
        let p3 = LonLat::new(0.002, 0.0);

        let from = segment_candidate(WayId(1), 0, 1, 2, 1, p1, p2, 0.0);
        let to = segment_candidate(WayId(1), 1, 2, 3, 1, p2, p3, 0.0);

        // dt=1s, maxvel=1 m/s, safety_factor=1 => budget 1m, but the hop is ~100m+.
        let cost = route(&cached, &pool, &from, &to, &cfg, 1.0).unwrap();
        assert!(cost.is_none());
    }
}
