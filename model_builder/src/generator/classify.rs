//! Classification of candidate positions against the configured sky window.

use serde::{Deserialize, Serialize};

use crate::astro::HorizonProfile;
use crate::models::ModelPointState;

/// Altitude and azimuth window a build may visit.
///
/// Altitude is the closed range `[min_altitude, max_altitude]`; azimuth is the
/// half-open range `[min_azimuth, max_azimuth)`, wrapping through north when
/// `min_azimuth > max_azimuth`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointBounds {
    #[serde(default = "default_min_altitude")]
    pub min_altitude_deg: f64,
    #[serde(default = "default_max_altitude")]
    pub max_altitude_deg: f64,
    #[serde(default = "default_min_azimuth")]
    pub min_azimuth_deg: f64,
    #[serde(default = "default_max_azimuth")]
    pub max_azimuth_deg: f64,
}

fn default_min_altitude() -> f64 {
    0.0
}

fn default_max_altitude() -> f64 {
    90.0
}

fn default_min_azimuth() -> f64 {
    0.0
}

fn default_max_azimuth() -> f64 {
    360.0
}

impl Default for PointBounds {
    fn default() -> Self {
        Self {
            min_altitude_deg: default_min_altitude(),
            max_altitude_deg: default_max_altitude(),
            min_azimuth_deg: default_min_azimuth(),
            max_azimuth_deg: default_max_azimuth(),
        }
    }
}

impl PointBounds {
    pub fn contains_altitude(&self, altitude_deg: f64) -> bool {
        altitude_deg >= self.min_altitude_deg && altitude_deg <= self.max_altitude_deg
    }

    pub fn contains_azimuth(&self, azimuth_deg: f64) -> bool {
        if self.min_azimuth_deg <= self.max_azimuth_deg {
            azimuth_deg >= self.min_azimuth_deg && azimuth_deg < self.max_azimuth_deg
        } else {
            azimuth_deg >= self.min_azimuth_deg || azimuth_deg < self.max_azimuth_deg
        }
    }
}

/// Classify a candidate. Checks run in order: altitude window, azimuth window,
/// horizon profile.
pub fn classify(
    altitude_deg: f64,
    azimuth_deg: f64,
    bounds: &PointBounds,
    horizon: &HorizonProfile,
) -> ModelPointState {
    if !bounds.contains_altitude(altitude_deg) {
        ModelPointState::OutsideAltitudeBounds
    } else if !bounds.contains_azimuth(azimuth_deg) {
        ModelPointState::OutsideAzimuthBounds
    } else if horizon.is_below(altitude_deg, azimuth_deg) {
        ModelPointState::BelowHorizon
    } else {
        ModelPointState::Generated
    }
}
