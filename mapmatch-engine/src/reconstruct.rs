//! Route reconstruction & summary.
//!
//! Stitches chosen candidates into a contiguous directed segment sequence,
//! collapsing duplicates and carrying cross-track stats and the
//! `gps_`-prefixed passthrough columns.

use std::collections::HashMap;

use mapmatch_common::{geodesy, Error, MatchResultTag, NodeId, WayId};

use crate::candidate::Candidate;
use crate::condition::ConditionedPoint;
use crate::config::Config;
use crate::gateway::{CachedGateway, GatewayPool};
use crate::router;
use crate::viterbi::DecodeResult;
use crate::way::Segment;

/// One row of the points summary.
#[derive(Debug, Clone)]
pub struct PointSummaryRow {
    pub original_index: usize,
    pub datetime: chrono::NaiveDateTime,
    pub matched: bool,
    pub is_break: bool,
    pub way_id: Option<WayId>,
    pub segment_index: Option<usize>,
    pub node1: Option<NodeId>,
    pub node2: Option<NodeId>,
    pub way_tags: Option<HashMap<String, String>>,
    pub xte_m: Option<f64>,
    pub alongtrack_m: Option<f64>,
    pub segment_bearing_deg: Option<f64>,
    pub gps_bearing_deg: Option<f64>,
    pub passthrough: HashMap<String, serde_json::Value>,
    /// Vestigial in the source this behavior is drawn from; always `1.0`.
    /// Kept for output-shape compatibility, not read back anywhere.
    pub weight: f64,
}

/// One row of the segments summary.
#[derive(Debug, Clone)]
pub struct SegmentSummaryRow {
    pub way_id: WayId,
    pub segment_index: usize,
    pub node1: NodeId,
    pub node2: NodeId,
    pub direction: i8,
    pub node2_tags: HashMap<String, String>,
    pub distance_m: f64,
    /// Observation indices (into the conditioned, non-gap lattice) whose
    /// chosen candidate lies on this segment.
    pub points_indices: Vec<usize>,
}

/// Summary statistics.
#[derive(Debug, Clone)]
pub struct Stats {
    pub in_points: usize,
    pub cleaned_points: usize,
    pub matched_points: usize,
    pub matched_proportion: f64,
    pub gps_distance_m: f64,
    pub segment_distance_m: f64,
    pub mean_xte_m: f64,
    pub result: MatchResultTag,
    pub trip_duration_minutes: f64,
}

/// One unbroken run of the segments summary, as `{lon: [...], lat: [...]}`.
#[derive(Debug, Clone)]
pub struct LineString {
    pub lon: Vec<f64>,
    pub lat: Vec<f64>,
}

/// Reconciles the decoder's chosen candidates into points/segments summaries.
/// `points`/`candidates` are the non-gap lattice; `in_points`/
/// `cleaned_points` are counts from earlier phases, needed for the stats row.
#[tracing::instrument(skip_all)]
pub fn reconstruct(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    points: &[ConditionedPoint],
    candidates: &[Vec<Candidate>],
    decode: &DecodeResult,
    cfg: &Config,
    in_points: usize,
    cleaned_points: usize,
) -> Result<(Vec<PointSummaryRow>, Vec<SegmentSummaryRow>, Stats), Error> {
    let breaks: std::collections::HashSet<usize> = decode.breaks.iter().copied().collect();

    let mut point_rows = Vec::with_capacity(points.len());
    let mut xte_sum = 0.0;
    let mut matched_count = 0usize;

    for (t, point) in points.iter().enumerate() {
        let chosen = decode.chosen[t];
        let is_break = breaks.contains(&t);
        let row = match chosen {
            Some(ci) => {
                let candidate = &candidates[t][ci];
                xte_sum += candidate.xte;
                matched_count += 1;
                let way = gateway.way_nodes(candidate.segment.way_id)?;
                PointSummaryRow {
                    original_index: point.original_index,
                    datetime: point.datetime,
                    matched: true,
                    is_break,
                    way_id: Some(candidate.segment.way_id),
                    segment_index: Some(candidate.segment.segment_index),
                    node1: Some(candidate.segment.node1),
                    node2: Some(candidate.segment.node2),
                    way_tags: Some(way.tags.clone()),
                    xte_m: Some(candidate.xte),
                    alongtrack_m: Some(candidate.alongtrack),
                    segment_bearing_deg: Some(candidate.segment.bearing_deg),
                    gps_bearing_deg: point.bearing,
                    passthrough: point.passthrough.clone(),
                    weight: 1.0,
                }
            }
            None => PointSummaryRow {
                original_index: point.original_index,
                datetime: point.datetime,
                matched: false,
                is_break,
                way_id: None,
                segment_index: None,
                node1: None,
                node2: None,
                way_tags: None,
                xte_m: None,
                alongtrack_m: None,
                segment_bearing_deg: None,
                gps_bearing_deg: point.bearing,
                passthrough: point.passthrough.clone(),
                weight: 1.0,
            },
        };
        point_rows.push(row);
    }

    let mut segment_rows: Vec<SegmentSummaryRow> = Vec::new();
    let mut segment_distance_m = 0.0;

    let chosen_indices: Vec<usize> = (0..points.len()).filter(|&t| decode.chosen[t].is_some()).collect();

    for window in chosen_indices.windows(2) {
        let (t_prev, t_cur) = (window[0], window[1]);
        if breaks.contains(&t_cur) {
            continue;
        }

        let prev_candidate = &candidates[t_prev][decode.chosen[t_prev].unwrap()];
        let cur_candidate = &candidates[t_cur][decode.chosen[t_cur].unwrap()];
        let dt_secs = (points[t_cur].datetime - points[t_prev].datetime).num_milliseconds() as f64 / 1000.0;

        let detail = router::route_detailed(gateway, pool, prev_candidate, cur_candidate, cfg, dt_secs)?;
        let Some(detail) = detail else {
            tracing::warn!(t_prev, t_cur, "reconstruction could not re-run a route the decoder had already accepted");
            continue;
        };

        for segment in &detail.path_segments {
            segment_distance_m += segment.distance_m;
            push_segment(gateway, &mut segment_rows, *segment, t_cur)?;
        }
    }

    let gps_distance_m: f64 = (1..points.len())
        .map(|i| geodesy::distance(points[i - 1].coord(), points[i].coord()))
        .sum();

    let trip_duration_minutes = if points.len() >= 2 {
        (points[points.len() - 1].datetime - points[0].datetime).num_milliseconds() as f64 / 60_000.0
    } else {
        0.0
    };

    let stats = Stats {
        in_points,
        cleaned_points,
        matched_points: matched_count,
        matched_proportion: if cleaned_points > 0 { matched_count as f64 / cleaned_points as f64 } else { 0.0 },
        gps_distance_m,
        segment_distance_m,
        mean_xte_m: if matched_count > 0 { xte_sum / matched_count as f64 } else { 0.0 },
        result: MatchResultTag::Ok,
        trip_duration_minutes,
    };

    Ok((point_rows, segment_rows, stats))
}

/// Appends `segment` to `rows`, collapsing it into the previous row when it
/// is identical to the last segment stitched.
fn push_segment(gateway: &CachedGateway, rows: &mut Vec<SegmentSummaryRow>, segment: Segment, point_index: usize) -> Result<(), Error> {
    if let Some(last) = rows.last_mut() {
        if last.way_id == segment.way_id && last.segment_index == segment.segment_index && last.direction == segment.direction {
            last.points_indices.push(point_index);
            return Ok(());
        }
    }

    let (_, node2_tags) = gateway.node(segment.node2)?;
    rows.push(SegmentSummaryRow {
        way_id: segment.way_id,
        segment_index: segment.segment_index,
        node1: segment.node1,
        node2: segment.node2,
        direction: segment.direction,
        node2_tags,
        distance_m: segment.distance_m,
        points_indices: vec![point_index],
    });
    Ok(())
}

/// Builds one `{lon, lat}` linestring per unbroken run of `rows`.
pub fn linestrings(gateway: &CachedGateway, rows: &[SegmentSummaryRow]) -> Result<Vec<LineString>, Error> {
    let mut runs = Vec::new();
    let mut current = LineString { lon: Vec::new(), lat: Vec::new() };

    for (i, row) in rows.iter().enumerate() {
        let (p1, _) = gateway.node(row.node1)?;
        let (p2, _) = gateway.node(row.node2)?;

        let discontinuous = i > 0 && rows[i - 1].node2 != row.node1;
        if discontinuous && !current.lon.is_empty() {
            runs.push(std::mem::replace(&mut current, LineString { lon: Vec::new(), lat: Vec::new() }));
        }
        if current.lon.is_empty() {
            current.lon.push(p1.lon);
            current.lat.push(p1.lat);
        }
        current.lon.push(p2.lon);
        current.lat.push(p2.lat);
    }

    if !current.lon.is_empty() {
        runs.push(current);
    }

    Ok(runs)
}
