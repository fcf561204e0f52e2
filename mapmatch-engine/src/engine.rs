//! Top-level orchestration: conditioning → candidate search → decode →
//! reconstruction, wired to this crate's gateway/config/error types.

use mapmatch_common::{Error, MatchResultTag};

use crate::candidate;
use crate::condition::{self, RawPoint};
use crate::config::Config;
use crate::gateway::{CachedGateway, GatewayPool, RoadNetworkGateway};
use crate::reconstruct::{self, PointSummaryRow, SegmentSummaryRow, Stats};
use crate::viterbi;

/// The three artifacts a match call produces.
#[derive(Debug, Clone)]
pub struct MatchOutput {
    pub points: Vec<PointSummaryRow>,
    pub segments: Vec<SegmentSummaryRow>,
    pub stats: Stats,
}

/// Matches `raw` GPS rows against the road network reachable through
/// `gateway`. Never returns an `Err`: every recoverable failure kind is
/// surfaced as a `MatchResultTag` in the returned stats block instead.
#[tracing::instrument(skip_all, fields(raw_count = raw.len()))]
pub fn match_trace(gateway: &dyn RoadNetworkGateway, raw: &[RawPoint], cfg: &Config) -> MatchOutput {
    match match_trace_inner(gateway, raw, cfg) {
        Ok(output) => output,
        Err(err) => {
            tracing::warn!(error = %err, result = %err.result_tag(), "match call aborted");
            empty_output(raw.len(), 0, err.result_tag())
        }
    }
}

fn empty_output(in_points: usize, cleaned_points: usize, result: MatchResultTag) -> MatchOutput {
    MatchOutput {
        points: Vec::new(),
        segments: Vec::new(),
        stats: Stats {
            in_points,
            cleaned_points,
            matched_points: 0,
            matched_proportion: 0.0,
            gps_distance_m: 0.0,
            segment_distance_m: 0.0,
            mean_xte_m: 0.0,
            result,
            trip_duration_minutes: 0.0,
        },
    }
}

fn match_trace_inner(gateway: &dyn RoadNetworkGateway, raw: &[RawPoint], cfg: &Config) -> Result<MatchOutput, Error> {
    cfg.validate()?;

    let conditioned = condition::condition_points(raw, cfg)?;
    let cleaned_points = conditioned.len();

    let cached = CachedGateway::new(gateway);
    let pool = GatewayPool::new(cfg.db_threads)?;

    let mut lattice_points = Vec::with_capacity(conditioned.len());
    let mut lattice_candidates = Vec::with_capacity(conditioned.len());

    for point in &conditioned {
        let candidates = candidate::search_candidates(&cached, &pool, point, cfg)?;
        if candidates.is_empty() {
            continue;
        }
        lattice_points.push(point.clone());
        lattice_candidates.push(candidates);
    }

    if lattice_points.len() < cfg.minpoints {
        return Err(Error::TooSparse { surviving: lattice_points.len(), required: cfg.minpoints });
    }

    let decode_result = viterbi::decode(&cached, &pool, &lattice_points, &lattice_candidates, cfg)?;

    let (points, segments, mut stats) =
        reconstruct::reconstruct(&cached, &pool, &lattice_points, &lattice_candidates, &decode_result, cfg, raw.len(), cleaned_points)?;
    stats.result = MatchResultTag::Ok;

    Ok(MatchOutput {
        points: if cfg.points_summary { points } else { Vec::new() },
        segments: if cfg.segments_summary { segments } else { Vec::new() },
        stats,
    })
}
