//! Bounded-lookahead Viterbi decoder.
//!
//! Classical forward-DP / backtrace shape, extended with a lookahead `L`
//! that scores each candidate by its best continuation over the next `L`
//! steps rather than just the next one, plus a problematic-point removal
//! loop that retries decoding with offending points dropped.

use std::cell::RefCell;
use std::collections::HashMap;

use mapmatch_common::{geodesy, Error};

use crate::candidate::Candidate;
use crate::condition::ConditionedPoint;
use crate::config::Config;
use crate::gateway::{CachedGateway, GatewayPool};
use crate::hmm;
use crate::router;

/// Result of decoding one lattice: the chosen candidate index per time step
/// (`None` where a point was dropped by problematic-point removal) and the
/// time steps at which the chosen path crosses a `-inf` transition ("break").
#[derive(Debug, Clone)]
pub struct DecodeResult {
    pub chosen: Vec<Option<usize>>,
    pub breaks: Vec<usize>,
}

/// Memoizes transition lookups (router call + transition probability) within
/// one decode pass, computing each lazily on first access rather than
/// precomputing the full matrix up front.
struct TransitionMemo<'a> {
    gateway: &'a CachedGateway<'a>,
    pool: &'a GatewayPool,
    cfg: &'a Config,
    points: &'a [ConditionedPoint],
    candidates: &'a [Vec<Candidate>],
    cache: RefCell<HashMap<(usize, usize, usize), f64>>,
}

impl<'a> TransitionMemo<'a> {
    fn new(gateway: &'a CachedGateway<'a>, pool: &'a GatewayPool, cfg: &'a Config, points: &'a [ConditionedPoint], candidates: &'a [Vec<Candidate>]) -> Self {
        TransitionMemo { gateway, pool, cfg, points, candidates, cache: RefCell::new(HashMap::new()) }
    }

    fn transition(&self, t: usize, i: usize, j: usize) -> Result<f64, Error> {
        if let Some(&cached) = self.cache.borrow().get(&(t, i, j)) {
            return Ok(cached);
        }
        let dt_secs = (self.points[t + 1].datetime - self.points[t].datetime).num_milliseconds() as f64 / 1000.0;
        let route_distance = router::route(self.gateway, self.pool, &self.candidates[t][i], &self.candidates[t + 1][j], self.cfg, dt_secs)?;
        let gps_distance = geodesy::distance(self.points[t].coord(), self.points[t + 1].coord());
        let log_a = hmm::transition_log_prob(route_distance, gps_distance, self.cfg);
        self.cache.borrow_mut().insert((t, i, j), log_a);
        Ok(log_a)
    }

    fn emission(&self, t: usize, i: usize) -> f64 {
        hmm::emission_log_prob(&self.candidates[t][i], &self.points[t], self.cfg)
    }

    /// Best `remaining`-step continuation score starting at `(t, j)`:
    /// `log e(t,j)` plus the best extension through up to `remaining`
    /// further steps.
    fn lookahead(&self, t: usize, j: usize, remaining: u32) -> Result<f64, Error> {
        let base = self.emission(t, j);
        if remaining == 0 || t + 1 >= self.candidates.len() {
            return Ok(base);
        }

        let mut best_extension = f64::NEG_INFINITY;
        for k in 0..self.candidates[t + 1].len() {
            let log_a = self.transition(t, j, k)?;
            if log_a == f64::NEG_INFINITY {
                continue;
            }
            let continuation = self.lookahead(t + 1, k, remaining - 1)?;
            best_extension = best_extension.max(log_a + continuation);
        }

        if best_extension.is_finite() {
            Ok(base + best_extension)
        } else {
            Ok(base)
        }
    }
}

/// Runs the bounded-lookahead Viterbi decoder, with up to `cfg.maxiter`
/// problematic-point-removal passes. `points`/`candidates` are
/// the non-gap lattice, aligned index-for-index.
#[tracing::instrument(skip_all, fields(observations = candidates.len()))]
pub fn decode(
    gateway: &CachedGateway,
    pool: &GatewayPool,
    points: &[ConditionedPoint],
    candidates: &[Vec<Candidate>],
    cfg: &Config,
) -> Result<DecodeResult, Error> {
    let t_count = candidates.len();
    let mut final_chosen: Vec<Option<usize>> = vec![None; t_count];
    let mut final_breaks: Vec<usize> = Vec::new();

    if t_count == 0 {
        return Ok(DecodeResult { chosen: final_chosen, breaks: final_breaks });
    }

    let mut active: Vec<usize> = (0..t_count).collect();

    for pass in 0..cfg.maxiter {
        if active.len() < 2 {
            if let Some(&t) = active.first() {
                let memo = TransitionMemo::new(gateway, pool, cfg, points, candidates);
                let best_i = (0..candidates[t].len())
                    .max_by(|&a, &b| memo.emission(t, a).total_cmp(&memo.emission(t, b)))
                    .expect("gap-free lattice entries always carry at least one candidate");
                final_chosen[t] = Some(best_i);
            }
            break;
        }

        let memo = TransitionMemo::new(gateway, pool, cfg, points, candidates);
        let n = active.len();

        let mut delta: Vec<Vec<f64>> = Vec::with_capacity(n);
        let mut backptr: Vec<Vec<usize>> = Vec::with_capacity(n);

        delta.push((0..candidates[active[0]].len()).map(|i| memo.emission(active[0], i)).collect());
        backptr.push(Vec::new());

        for step in 1..n {
            let t_prev = active[step - 1];
            let t_cur = active[step];
            let prev_delta = &delta[step - 1];

            let mut cur_delta = Vec::with_capacity(candidates[t_cur].len());
            let mut cur_back = Vec::with_capacity(candidates[t_cur].len());

            for j in 0..candidates[t_cur].len() {
                let lookahead_value = memo.lookahead(t_cur, j, cfg.viterbi_lookahead)?;

                let mut best_score = f64::NEG_INFINITY;
                let mut best_i = 0usize;
                for i in 0..candidates[t_prev].len() {
                    let log_a = memo.transition(t_prev, i, j)?;
                    let score = prev_delta[i] + log_a;
                    if score > best_score {
                        best_score = score;
                        best_i = i;
                    }
                }
                cur_delta.push(best_score + lookahead_value);
                cur_back.push(best_i);
            }

            delta.push(cur_delta);
            backptr.push(cur_back);
        }

        let last_delta = &delta[n - 1];
        let mut j = (0..last_delta.len())
            .max_by(|&a, &b| last_delta[a].total_cmp(&last_delta[b]))
            .expect("every active time step carries at least one candidate");
        let mut path = vec![j];
        for step in (1..n).rev() {
            j = backptr[step][j];
            path.push(j);
        }
        path.reverse();

        for (step, &choice) in path.iter().enumerate() {
            final_chosen[active[step]] = Some(choice);
        }

        let mut breaks = Vec::new();
        let mut edge_probs: Vec<f64> = Vec::with_capacity(n.saturating_sub(1));
        for step in 1..n {
            let log_a = memo.transition(active[step - 1], path[step - 1], path[step])?;
            edge_probs.push(log_a.exp());
            if log_a == f64::NEG_INFINITY {
                breaks.push(active[step]);
            }
        }
        final_breaks = breaks;

        if pass + 1 >= cfg.maxiter {
            break;
        }

        let threshold = edge_probs.iter().cloned().filter(|&p| p > 0.0).fold(f64::INFINITY, f64::min);
        if !threshold.is_finite() {
            break;
        }

        let mut to_drop = Vec::new();
        for step in 0..n {
            let prev_weak = step > 0 && edge_probs[step - 1] <= threshold;
            let next_weak = step + 1 < n && edge_probs[step] <= threshold;
            if prev_weak || next_weak {
                to_drop.push(active[step]);
            }
        }
        if to_drop.is_empty() {
            break;
        }

        for &t in &to_drop {
            tracing::debug!(observation_index = points[t].original_index, reason = "problematic_point", "dropping point before redecode");
        }
        active.retain(|t| !to_drop.contains(t));
    }

    Ok(DecodeResult { chosen: final_chosen, breaks: final_breaks })
}
