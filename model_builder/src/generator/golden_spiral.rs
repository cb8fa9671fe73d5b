//! Golden-spiral sampling of the visible hemisphere.
//!
//! Candidate `i` of a working total `T` lands at
//!
//! ```text
//! azimuth  = (2π·i / φ) mod 2π
//! altitude = 90° - acos(1 - 2(i + ε) / (2T - 1 + 2ε))
//! ```
//!
//! clamped to `[0.1°, 89.9°]`. Since the horizon and the bounds discard some
//! candidates, `T` is searched until the number of valid points matches the
//! requested count.

use log::{debug, warn};

use crate::astro::HorizonProfile;
use crate::error::GeneratorError;
use crate::models::{ModelPoint, ModelPointState};

use super::classify::{classify, PointBounds};

const GOLDEN_RATIO: f64 = 1.618_033_988_749_895;
const EPSILON: f64 = 0.36;
const MIN_ALTITUDE_DEG: f64 = 0.1;
const MAX_ALTITUDE_DEG: f64 = 89.9;
const MAX_SEARCH_ITERATIONS: usize = 32;

/// Raw spiral position of candidate `i` out of `total`, as `(altitude, azimuth)`.
pub fn spiral_position(i: usize, total: usize) -> (f64, f64) {
    let i = i as f64;
    let total = total as f64;
    let azimuth = ((2.0 * std::f64::consts::PI * i / GOLDEN_RATIO)
        .rem_euclid(2.0 * std::f64::consts::PI))
    .to_degrees();
    let polar = (1.0 - 2.0 * (i + EPSILON) / (2.0 * total - 1.0 + 2.0 * EPSILON))
        .clamp(-1.0, 1.0)
        .acos()
        .to_degrees()
        .rem_euclid(180.0);
    let altitude = (90.0 - polar).clamp(MIN_ALTITUDE_DEG, MAX_ALTITUDE_DEG);
    // rem_euclid can land exactly on 360.0 after rounding
    let azimuth = if azimuth >= 360.0 { 0.0 } else { azimuth };
    (altitude, azimuth)
}

fn candidates(
    total: usize,
    bounds: &PointBounds,
    horizon: &HorizonProfile,
) -> (Vec<ModelPoint>, usize) {
    let mut valid = 0;
    let points = (0..total)
        .map(|i| {
            let (alt, az) = spiral_position(i, total);
            let state = classify(alt, az, bounds, horizon);
            if state == ModelPointState::Generated {
                valid += 1;
            }
            ModelPoint::new(i, alt, az, state)
        })
        .collect();
    (points, valid)
}

/// Generate a spiral with `requested` valid points.
///
/// When no working total yields exactly `requested`, the closest achievable set is
/// returned (larger count wins ties) and a warning is logged.
pub fn generate(
    requested: usize,
    bounds: &PointBounds,
    horizon: &HorizonProfile,
) -> Result<Vec<ModelPoint>, GeneratorError> {
    if requested == 0 {
        return Err(GeneratorError::InvalidPointCount(requested));
    }

    // lower: largest total known to give too few; upper: smallest known to give too many
    let mut lower = 0usize;
    let mut upper: Option<usize> = None;
    let mut total = requested;
    let mut best: Option<(Vec<ModelPoint>, usize)> = None;

    for iteration in 0..MAX_SEARCH_ITERATIONS {
        let (points, valid) = candidates(total, bounds, horizon);
        debug!(
            "golden spiral iteration {}: total={} valid={} requested={}",
            iteration, total, valid, requested
        );

        if valid == requested {
            return Ok(points);
        }

        let improves = match &best {
            None => true,
            Some((_, best_valid)) => {
                let d = valid.abs_diff(requested);
                let best_d = best_valid.abs_diff(requested);
                d < best_d || (d == best_d && valid > *best_valid)
            }
        };

        let mut next = if valid < requested {
            lower = lower.max(total);
            total + (requested - valid)
        } else {
            upper = Some(upper.map_or(total, |u| u.min(total)));
            total.saturating_sub(valid - requested)
        };

        if improves {
            best = Some((points, valid));
        }

        let upper_limit = upper.unwrap_or(usize::MAX);
        if next <= lower || next >= upper_limit {
            next = lower + (upper_limit - lower) / 2;
        }
        if next <= lower || next >= upper_limit || next == total {
            break;
        }
        total = next;
    }

    match best {
        Some((points, valid)) => {
            warn!(
                "golden spiral could not produce exactly {} valid points; using {}",
                requested, valid
            );
            Ok(points)
        }
        None => Ok(Vec::new()),
    }
}
