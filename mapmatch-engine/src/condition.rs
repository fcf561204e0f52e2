//! Input conditioning / `cleanpoints`.
//!
//! Parses and truncates datetimes, drops consecutive duplicates and
//! implausible jumps relative to the previous *surviving* point, then
//! recomputes bearing/rotation/distance over a centered window of
//! `parameter_window` points (one-sided at the ends).

use std::collections::HashMap;

use chrono::NaiveDateTime;
use mapmatch_common::{geodesy, Error, LonLat};
use serde_json::Value;

use crate::config::Config;

/// One raw input row, as handed to the engine by the (out-of-scope) tabular
/// container.
#[derive(Debug, Clone)]
pub struct RawPoint {
    pub original_index: usize,
    pub datetime: String,
    pub lon: f64,
    pub lat: f64,
    /// Extra columns, passed through to the points summary prefixed `gps_`.
    pub passthrough: HashMap<String, Value>,
}

/// A conditioned GPS observation.
#[derive(Debug, Clone)]
pub struct ConditionedPoint {
    pub original_index: usize,
    pub datetime: NaiveDateTime,
    pub lon: f64,
    pub lat: f64,
    pub velocity: f64,
    pub bearing: Option<f64>,
    pub rotation: Option<f64>,
    pub distance_from_previous: f64,
    pub passthrough: HashMap<String, Value>,
}

impl ConditionedPoint {
    pub fn coord(&self) -> LonLat {
        LonLat::new(self.lon, self.lat)
    }
}

fn parse_datetime(s: &str) -> Result<NaiveDateTime, Error> {
    let truncated: String = s.chars().take(19).collect();
    NaiveDateTime::parse_from_str(&truncated, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| Error::Input(format!("unparseable datetime '{s}': {e}")))
}

struct Parsed {
    original_index: usize,
    dt: NaiveDateTime,
    lon: f64,
    lat: f64,
    passthrough: HashMap<String, Value>,
}

/// Runs the full `cleanpoints` pipeline over raw input rows.
#[tracing::instrument(skip_all, fields(raw_count = raw.len()))]
pub fn condition_points(raw: &[RawPoint], cfg: &Config) -> Result<Vec<ConditionedPoint>, Error> {
    if raw.is_empty() {
        return Err(Error::Input("empty input".into()));
    }

    let mut parsed = Vec::with_capacity(raw.len());
    for p in raw {
        parsed.push(Parsed {
            original_index: p.original_index,
            dt: parse_datetime(&p.datetime)?,
            lon: p.lon,
            lat: p.lat,
            passthrough: p.passthrough.clone(),
        });
    }

    let deduped = drop_consecutive_duplicates(parsed);
    let survivors = filter_implausible_jumps(deduped, cfg);

    Ok(recompute_derived_fields(&survivors, cfg))
}

fn drop_consecutive_duplicates(parsed: Vec<Parsed>) -> Vec<Parsed> {
    let mut out: Vec<Parsed> = Vec::with_capacity(parsed.len());
    for p in parsed {
        let is_dup = out
            .last()
            .map(|last| last.lon == p.lon && last.lat == p.lat && last.dt == p.dt)
            .unwrap_or(false);
        if !is_dup {
            out.push(p);
        } else {
            tracing::debug!(original_index = p.original_index, "dropping consecutive duplicate point");
        }
    }
    out
}

fn filter_implausible_jumps(deduped: Vec<Parsed>, cfg: &Config) -> Vec<Parsed> {
    let mut survivors: Vec<Parsed> = Vec::with_capacity(deduped.len());
    for p in deduped {
        if let Some(last) = survivors.last() {
            let dt_secs = (p.dt - last.dt).num_milliseconds() as f64 / 1000.0;
            let dist = geodesy::distance(LonLat::new(last.lon, last.lat), LonLat::new(p.lon, p.lat));
            let velocity = if dt_secs > 0.0 { dist / dt_secs } else { f64::INFINITY };

            if velocity < cfg.min_velocity || velocity > cfg.maxvel {
                tracing::debug!(original_index = p.original_index, velocity, reason = "implausible_velocity", "dropping point");
                continue;
            }
            if dist < cfg.minpointdistance {
                tracing::debug!(original_index = p.original_index, dist, reason = "below_minpointdistance", "dropping point");
                continue;
            }
        }
        survivors.push(p);
    }
    survivors
}

fn recompute_derived_fields(survivors: &[Parsed], cfg: &Config) -> Vec<ConditionedPoint> {
    let n = survivors.len();
    let half = cfg.parameter_window / 2;
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        if n == 1 {
            out.push(ConditionedPoint {
                original_index: survivors[i].original_index,
                datetime: survivors[i].dt,
                lon: survivors[i].lon,
                lat: survivors[i].lat,
                velocity: 0.0,
                bearing: None,
                rotation: None,
                distance_from_previous: 0.0,
                passthrough: survivors[i].passthrough.clone(),
            });
            continue;
        }

        let lo = i.saturating_sub(half);
        let hi = (i + half).min(n - 1);

        let distance_from_previous = if i == 0 {
            0.0
        } else {
            geodesy::distance(
                LonLat::new(survivors[i - 1].lon, survivors[i - 1].lat),
                LonLat::new(survivors[i].lon, survivors[i].lat),
            )
        };

        let window_start = LonLat::new(survivors[lo].lon, survivors[lo].lat);
        let window_end = LonLat::new(survivors[hi].lon, survivors[hi].lat);
        let window_dt = (survivors[hi].dt - survivors[lo].dt).num_milliseconds() as f64 / 1000.0;
        let window_dist = geodesy::distance(window_start, window_end);

        let velocity = if window_dt > 0.0 { window_dist / window_dt } else { 0.0 };
        let bearing = if hi > lo && window_dist > 0.0 {
            Some(geodesy::bearing(window_start, window_end))
        } else {
            None
        };

        let rotation = if i > 0 && i + 1 < n {
            let b_in = geodesy::bearing(
                LonLat::new(survivors[i - 1].lon, survivors[i - 1].lat),
                LonLat::new(survivors[i].lon, survivors[i].lat),
            );
            let b_out = geodesy::bearing(
                LonLat::new(survivors[i].lon, survivors[i].lat),
                LonLat::new(survivors[i + 1].lon, survivors[i + 1].lat),
            );
            let raw_diff = b_out - b_in;
            Some(((raw_diff + 180.0).rem_euclid(360.0)) - 180.0)
        } else {
            None
        };

        out.push(ConditionedPoint {
            original_index: survivors[i].original_index,
            datetime: survivors[i].dt,
            lon: survivors[i].lon,
            lat: survivors[i].lat,
            velocity,
            bearing,
            rotation,
            distance_from_previous,
            passthrough: survivors[i].passthrough.clone(),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(idx: usize, dt: &str, lon: f64, lat: f64) -> RawPoint {
        RawPoint { original_index: idx, datetime: dt.to_string(), lon, lat, passthrough: HashMap::new() }
    }

    #[test]
    fn empty_input_is_rejected() {
        let cfg = Config::default();
        assert!(condition_points(&[], &cfg).is_err());
    }

    #[test]
    fn unparseable_datetime_is_input_error() {
        let cfg = Config::default();
        let rows = [raw(0, "not-a-date", 0.0, 0.0)];
        let err = condition_points(&rows, &cfg).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }

    #[test]
    fn trailing_characters_in_datetime_are_stripped() {
        let cfg = Config::default();
        let rows = [
            raw(0, "2020-01-01 00:00:00.000000", 0.0, 0.0),
            raw(1, "2020-01-01 00:00:10.000000", 0.001, 0.0),
        ];
        let result = condition_points(&rows, &cfg).unwrap();
        assert!(!result.is_empty());
    }

    #[test]
    fn consecutive_duplicates_are_dropped() {
        let cfg = Config::default();
        let rows = [
            raw(0, "2020-01-01 00:00:00", 0.0, 0.0),
            raw(1, "2020-01-01 00:00:00", 0.0, 0.0),
            raw(2, "2020-01-01 00:00:10", 0.01, 0.0),
        ];
        let result = condition_points(&rows, &cfg).unwrap();
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn points_below_minpointdistance_are_dropped() {
        let mut cfg = Config::default();
        cfg.minpointdistance = 1000.0;
        let rows = [
            raw(0, "2020-01-01 00:00:00", 0.0, 0.0),
            raw(1, "2020-01-01 00:00:10", 0.0001, 0.0), // ~ a few meters, below floor
            raw(2, "2020-01-01 00:00:20", 0.1, 0.0),    // far beyond floor
        ];
        let result = condition_points(&rows, &cfg).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].original_index, 2);
    }

    #[test]
    fn implausible_velocity_is_dropped() {
        let mut cfg = Config::default();
        cfg.maxvel = 10.0;
        let rows = [
            raw(0, "2020-01-01 00:00:00", 0.0, 0.0),
            // ~111m in 1 second => ~111 m/s, above the 10 m/s cap
            raw(1, "2020-01-01 00:00:01", 0.001, 0.0),
            raw(2, "2020-01-01 00:00:11", 0.0015, 0.0),
        ];
        let result = condition_points(&rows, &cfg).unwrap();
        assert!(result.iter().all(|p| p.original_index != 1));
    }

    #[test]
    fn single_surviving_point_has_no_bearing_or_rotation() {
        let cfg = Config::default();
        let rows = [raw(0, "2020-01-01 00:00:00", 0.0, 0.0)];
        let result = condition_points(&rows, &cfg).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result[0].bearing.is_none());
        assert!(result[0].rotation.is_none());
    }

    #[test]
    fn original_index_is_retained_through_conditioning() {
        let cfg = Config::default();
        let rows = [
            raw(5, "2020-01-01 00:00:00", 0.0, 0.0),
            raw(9, "2020-01-01 00:00:10", 0.01, 0.0),
        ];
        let result = condition_points(&rows, &cfg).unwrap();
        assert_eq!(result[0].original_index, 5);
        assert_eq!(result[1].original_index, 9);
    }
}
