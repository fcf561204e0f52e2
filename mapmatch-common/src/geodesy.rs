//! Spherical-Earth geodesy primitives.
//!
//! All public functions take and return degrees; internal computation is in
//! radians. Covers the full formula set map matching needs against a
//! spherical earth model: great-circle distance, bearing, along-track and
//! cross-track distance, and clamped projection onto a segment. Results are
//! pure functions of their inputs; no global state.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A WGS84 geographic coordinate, `(lon, lat)` in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LonLat {
    pub lon: f64,
    pub lat: f64,
}

impl LonLat {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Great-circle distance between two points, in meters.
pub fn distance(a: LonLat, b: LonLat) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let sin_dphi2 = (d_phi / 2.0).sin();
    let sin_dlam2 = (d_lambda / 2.0).sin();
    let h = sin_dphi2 * sin_dphi2 + phi1.cos() * phi2.cos() * sin_dlam2 * sin_dlam2;
    let c = 2.0 * h.sqrt().min(1.0).atan2((1.0 - h).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b`, in degrees, `0=N` clockwise, `[0, 360)`.
pub fn bearing(a: LonLat, b: LonLat) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    let theta = y.atan2(x).to_degrees();
    (theta + 360.0) % 360.0
}

/// Unsigned angular difference between two bearings in degrees, result in `[0, 180]`.
pub fn angular_difference(a_deg: f64, b_deg: f64) -> f64 {
    let d = (a_deg - b_deg).rem_euclid(360.0);
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// Along-track and cross-track distance of `p` relative to the great-circle
/// segment `a -> b`.
///
/// `along_m` is signed: negative if `p` projects behind `a`, and may exceed
/// `distance(a, b)` if `p` projects beyond `b`. `xte_m` is unsigned.
pub fn along_and_cross_track(a: LonLat, b: LonLat, p: LonLat) -> (f64, f64) {
    let r = EARTH_RADIUS_M;

    if a.lon == b.lon && a.lat == b.lat {
        // Degenerate zero-length segment: all "along" distance is zero, xte
        // is simply the distance to the shared point.
        return (0.0, distance(a, p));
    }

    let delta_13 = distance(a, p) / r; // angular distance a -> p
    let theta_13 = bearing(a, p).to_radians();
    let theta_12 = bearing(a, b).to_radians();

    let xte_rad = (delta_13.sin() * (theta_13 - theta_12).sin())
        .clamp(-1.0, 1.0)
        .asin();

    let cos_arg = if xte_rad.cos().abs() < 1e-12 {
        // p is essentially at the antipode of the track's great circle;
        // fall back to the unsigned angular distance itself.
        delta_13.cos()
    } else {
        (delta_13.cos() / xte_rad.cos()).clamp(-1.0, 1.0)
    };
    let mut along_m = cos_arg.acos() * r;

    if (theta_13 - theta_12).cos() < 0.0 {
        along_m = -along_m;
    }

    (along_m, (xte_rad * r).abs())
}

/// The destination point reached by travelling `dist_m` meters from `a` along
/// initial bearing `bearing_deg`.
pub fn destination(a: LonLat, bearing_deg: f64, dist_m: f64) -> LonLat {
    let r = EARTH_RADIUS_M;
    let delta = dist_m / r;
    let theta = bearing_deg.to_radians();
    let phi1 = a.lat.to_radians();
    let lambda1 = a.lon.to_radians();

    let phi2 = (phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos())
        .clamp(-1.0, 1.0)
        .asin();
    let lambda2 = lambda1
        + (theta.sin() * delta.sin() * phi1.cos())
            .atan2(delta.cos() - phi1.sin() * phi2.sin());

    LonLat::new(lambda2.to_degrees(), phi2.to_degrees())
}

/// Projects `p` onto the segment `a -> b`, clamped to the segment's
/// endpoints.
pub fn project_on_segment(a: LonLat, b: LonLat, p: LonLat) -> LonLat {
    if a.lon == b.lon && a.lat == b.lat {
        return a;
    }
    let seg_len = distance(a, b);
    let (along_m, _xte_m) = along_and_cross_track(a, b, p);
    let clamped = along_m.clamp(0.0, seg_len);
    destination(a, bearing(a, b), clamped)
}
