//! Points along one target's diurnal path.
//!
//! The target's topocentric position is sampled every `ra_delta` of sidereal
//! rotation across a time window. Too many valid samples widen the step and
//! restart the sampling.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::astro::{
    equatorial_to_horizontal, true_to_apparent_altitude, AtmosphericConditions, HorizonProfile,
    ObserverSite, SIDEREAL_TO_SOLAR,
};
use crate::error::GeneratorError;
use crate::models::{EquatorialCoordinates, ModelPoint, ModelPointState, ModifiedJulianDate};

use super::classify::{classify, PointBounds};

/// Upper limit on valid points along a path.
pub const MAX_PATH_POINTS: usize = 100;

const MIN_RA_DELTA_ARCSEC: f64 = 1.0;
const MAX_WINDOW_HOURS: i64 = 24;
const MAX_RESTARTS: u32 = 16;

/// Azimuth band around the meridian the mount cannot cross without a flip.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeridianLimits {
    #[serde(default)]
    pub east_deg: f64,
    #[serde(default)]
    pub west_deg: f64,
}

impl MeridianLimits {
    /// Move an azimuth inside `(meridian - east, meridian + west)` to the nearer edge.
    pub fn clamp_azimuth(&self, azimuth_deg: f64, meridian_deg: f64) -> f64 {
        if self.east_deg <= 0.0 && self.west_deg <= 0.0 {
            return azimuth_deg;
        }
        let mut d = (azimuth_deg - meridian_deg).rem_euclid(360.0);
        if d > 180.0 {
            d -= 360.0;
        }
        if d <= -self.east_deg || d >= self.west_deg {
            return azimuth_deg;
        }
        let edge = if d + self.east_deg <= self.west_deg - d {
            meridian_deg - self.east_deg
        } else {
            meridian_deg + self.west_deg
        };
        edge.rem_euclid(360.0)
    }
}

/// Inputs for sidereal-path generation.
#[derive(Debug, Clone)]
pub struct SiderealPathRequest {
    pub target: EquatorialCoordinates,
    /// Sidereal rotation between consecutive samples, degrees of RA
    pub ra_delta_deg: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub site: ObserverSite,
    pub conditions: AtmosphericConditions,
    pub meridian_limits: MeridianLimits,
}

/// Generated path and the RA step that produced it.
#[derive(Debug, Clone)]
pub struct SiderealPath {
    pub points: Vec<ModelPoint>,
    /// Step actually used, after any widening
    pub ra_delta_deg: f64,
    /// Every step tried, in order
    pub attempted_deltas: Vec<f64>,
}

impl SiderealPath {
    pub fn valid_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.state == ModelPointState::Generated)
            .count()
    }
}

/// Solar time between samples for an RA step.
pub fn sample_interval(ra_delta_deg: f64) -> Duration {
    let sidereal_hours = ra_delta_deg / 15.0;
    let solar_seconds = sidereal_hours * SIDEREAL_TO_SOLAR * 3600.0;
    Duration::microseconds((solar_seconds * 1e6).round() as i64)
}

fn validate(request: &SiderealPathRequest) -> Result<(), GeneratorError> {
    if request.end <= request.start {
        return Err(GeneratorError::InvalidTimeWindow(format!(
            "end {} is not after start {}",
            request.end, request.start
        )));
    }
    if request.end - request.start > Duration::hours(MAX_WINDOW_HOURS) {
        return Err(GeneratorError::InvalidTimeWindow(format!(
            "window of {} exceeds 24 hours",
            request.end - request.start
        )));
    }
    let arcsec = request.ra_delta_deg * 3600.0;
    if !arcsec.is_finite() || arcsec < MIN_RA_DELTA_ARCSEC {
        return Err(GeneratorError::InvalidRaDelta(arcsec));
    }
    Ok(())
}

fn sample(
    request: &SiderealPathRequest,
    ra_delta_deg: f64,
    bounds: &PointBounds,
    horizon: &HorizonProfile,
) -> Vec<ModelPoint> {
    let step = sample_interval(ra_delta_deg);
    let meridian = request.site.meridian_azimuth();
    let mut points = Vec::new();
    let mut at = request.start;
    while at <= request.end {
        let mjd = ModifiedJulianDate::from(at);
        let topo = equatorial_to_horizontal(&request.target, &request.site, mjd);
        let alt = true_to_apparent_altitude(topo.altitude.value(), &request.conditions);
        let az = request
            .meridian_limits
            .clamp_azimuth(topo.azimuth.value(), meridian);
        let state = classify(alt, az, bounds, horizon);
        points.push(ModelPoint::new(points.len(), alt, az, state));
        match at.checked_add_signed(step) {
            Some(next) => at = next,
            None => break,
        }
    }
    points
}

/// Sample the path, widening the step until at most [`MAX_PATH_POINTS`] are valid.
pub fn generate(
    request: &SiderealPathRequest,
    bounds: &PointBounds,
    horizon: &HorizonProfile,
) -> Result<SiderealPath, GeneratorError> {
    validate(request)?;

    let mut ra_delta = request.ra_delta_deg;
    let mut attempted = Vec::new();
    for _ in 0..=MAX_RESTARTS {
        attempted.push(ra_delta);
        let points = sample(request, ra_delta, bounds, horizon);
        let valid = points
            .iter()
            .filter(|p| p.state == ModelPointState::Generated)
            .count();
        debug!(
            "sidereal path with delta {:.4}°: {} samples, {} valid",
            ra_delta,
            points.len(),
            valid
        );
        if valid <= MAX_PATH_POINTS {
            return Ok(SiderealPath {
                points,
                ra_delta_deg: ra_delta,
                attempted_deltas: attempted,
            });
        }
        let factor = valid as f64 / MAX_PATH_POINTS as f64;
        info!(
            "sidereal path has {} valid points, widening RA delta by {:.3}",
            valid, factor
        );
        ra_delta *= factor;
    }

    // Each widening at least halves the excess, so this only trips on pathological input.
    Err(GeneratorError::InvalidRaDelta(ra_delta * 3600.0))
}
