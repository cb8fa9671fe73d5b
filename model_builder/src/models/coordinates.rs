//! Coordinate value types shared by the generator, the orchestrator and the devices.

use qtty::Degrees;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wrap an hour difference into `(-12, 12]`.
pub fn wrap_hours_signed(hours: f64) -> f64 {
    let mut wrapped = hours.rem_euclid(24.0);
    if wrapped > 12.0 {
        wrapped -= 24.0;
    }
    wrapped
}

/// Right ascension / declination pair, RA in hours, Dec in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquatorialCoordinates {
    pub ra_hours: f64,
    pub dec_deg: f64,
}

impl EquatorialCoordinates {
    /// Create a coordinate pair, wrapping RA into `[0, 24)`.
    pub fn new(ra_hours: f64, dec_deg: f64) -> Self {
        Self {
            ra_hours: ra_hours.rem_euclid(24.0),
            dec_deg,
        }
    }

    /// Apply a systematic offset, keeping RA in range and Dec within the poles.
    pub fn offset_by(&self, offset: &CoordinateOffset) -> Self {
        Self::new(
            self.ra_hours + offset.ra_hours,
            (self.dec_deg + offset.dec_deg).clamp(-90.0, 90.0),
        )
    }
}

impl fmt::Display for EquatorialCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RA={:.4}h Dec={:+.4}°", self.ra_hours, self.dec_deg)
    }
}

/// Systematic difference between where the mount thinks it points and where it
/// actually points.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinateOffset {
    pub ra_hours: f64,
    pub dec_deg: f64,
}

impl CoordinateOffset {
    /// Offset that, added to a target, compensates for the mount's pointing error:
    /// `reported - solved`, with RA taken the short way around.
    pub fn between(reported: &EquatorialCoordinates, solved: &EquatorialCoordinates) -> Self {
        Self {
            ra_hours: wrap_hours_signed(reported.ra_hours - solved.ra_hours),
            dec_deg: reported.dec_deg - solved.dec_deg,
        }
    }
}

/// Altitude / azimuth pair. Azimuth is measured from north through east.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizontalCoordinates {
    pub altitude: Degrees,
    pub azimuth: Degrees,
}

impl HorizontalCoordinates {
    pub fn new(altitude_deg: f64, azimuth_deg: f64) -> Self {
        Self {
            altitude: Degrees::new(altitude_deg),
            azimuth: Degrees::new(azimuth_deg),
        }
    }
}

/// German-equatorial side of pier, as reported by the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PierSide {
    East,
    West,
    #[default]
    Unknown,
}

impl PierSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            PierSide::East => "east",
            PierSide::West => "west",
            PierSide::Unknown => "unknown",
        }
    }
}

impl fmt::Display for PierSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
