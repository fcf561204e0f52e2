//! Engine configuration.
//!
//! A plain, validated struct rather than options scattered through call
//! sites, deserializable via `serde` so callers can load it from TOML/JSON.

use mapmatch_common::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Candidate search radius, meters.
    pub searchradius: f64,
    /// Minimum conditioned points required to proceed.
    pub minpoints: usize,
    /// Router cutoff velocity, m/s.
    pub maxvel: f64,
    /// Emission spatial sigma, meters.
    pub sigma_z: f64,
    /// Transition scale.
    pub beta: f64,
    /// Decoder iteration cap (problematic-point removal passes).
    pub maxiter: u32,
    /// Conditioning floor: minimum distance to previous surviving point, meters.
    pub minpointdistance: f64,
    /// Minimum plausible velocity between consecutive surviving points, m/s.
    pub min_velocity: f64,
    /// Derived-quantity window size (conditioning), in points.
    pub parameter_window: usize,
    /// Emission bearing weight.
    pub bearing_penalty_weight: f64,
    /// Decoder lookahead `L`.
    pub viterbi_lookahead: u32,
    /// Whether to compute transitions lazily (on demand) vs. precompute the
    /// full matrix. Must not change observable behavior, only the order of
    /// computation.
    pub lazy_probabilities: bool,
    /// Whether to emit the points summary.
    pub points_summary: bool,
    /// Whether to emit the segments summary.
    pub segments_summary: bool,
    /// Bounded gateway fan-out pool size.
    pub db_threads: usize,
    /// Safety factor applied to the router's `maxvel * dt` cutoff.
    pub router_safety_factor: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            searchradius: 50.0,
            minpoints: 10,
            maxvel: 250.0,
            sigma_z: 10.0,
            beta: 10.0,
            maxiter: 1,
            minpointdistance: 30.0,
            min_velocity: 0.0,
            parameter_window: 3,
            bearing_penalty_weight: 1.0,
            viterbi_lookahead: 1,
            lazy_probabilities: true,
            points_summary: true,
            segments_summary: true,
            db_threads: 20,
            router_safety_factor: 1.5,
        }
    }
}

impl Config {
    /// Validates configured invariants once, up front, turning a misconfigured
    /// engine into an immediate `Error::Input` rather than a confusing
    /// downstream failure.
    pub fn validate(&self) -> Result<(), Error> {
        let mut problems = Vec::new();
        if self.searchradius <= 0.0 {
            problems.push("searchradius must be > 0");
        }
        if self.minpoints < 1 {
            problems.push("minpoints must be >= 1");
        }
        if self.maxvel <= 0.0 {
            problems.push("maxvel must be > 0");
        }
        if self.sigma_z <= 0.0 {
            problems.push("sigmaZ must be > 0");
        }
        if self.beta <= 0.0 {
            problems.push("beta must be > 0");
        }
        if self.maxiter < 1 {
            problems.push("maxiter must be >= 1");
        }
        if self.parameter_window < 1 {
            problems.push("parameter_window must be >= 1");
        }
        if self.db_threads < 1 {
            problems.push("db_threads must be >= 1");
        }
        if self.router_safety_factor <= 0.0 {
            problems.push("router_safety_factor must be > 0");
        }
        if self.viterbi_lookahead > 10 {
            problems.push("viterbi_lookahead must be <= 10");
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Input(problems.join("; ")))
        }
    }
}
