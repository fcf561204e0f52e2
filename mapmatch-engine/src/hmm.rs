//! Emission and transition probability model, in log-space.
//!
//! Emission combines a Gaussian cross-track term with a bearing term.
//! Segment bearing already encodes direction (a `direction=-1` candidate's
//! `Segment::bearing_deg` is the reverse traversal's own forward bearing,
//! built that way in [`crate::way`]), so no extra `+180` flip is needed here.
//! Transition is an exponential penalty on route/GPS distance discrepancy.

use mapmatch_common::geodesy;

use crate::candidate::Candidate;
use crate::condition::ConditionedPoint;
use crate::config::Config;

/// `log e` for `candidate` against observation `point`.
pub fn emission_log_prob(candidate: &Candidate, point: &ConditionedPoint, cfg: &Config) -> f64 {
    let denom = 2.0 * cfg.sigma_z * cfg.sigma_z;
    let spatial = -(candidate.xte * candidate.xte) / denom;

    let bearing_term = match point.bearing {
        Some(observed_bearing) => {
            let delta_theta = geodesy::angular_difference(candidate.segment.bearing_deg, observed_bearing);
            -(cfg.bearing_penalty_weight * delta_theta * delta_theta) / denom
        }
        None => 0.0,
    };

    spatial + bearing_term
}

/// `log a` between a candidate of `o_t` and a candidate of `o_{t+1}`.
/// `route_distance = None` means unreachable within the router's
/// budget, mapping to `-inf`.
pub fn transition_log_prob(route_distance: Option<f64>, gps_distance: f64, cfg: &Config) -> f64 {
    match route_distance {
        None => f64::NEG_INFINITY,
        Some(d) => -(d - gps_distance).abs() / cfg.beta,
    }
}
