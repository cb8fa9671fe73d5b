//! Local horizon profile.
//!
//! A list of `(azimuth, altitude)` samples interpolated linearly, wrapping through
//! north. An empty profile is a flat 0° horizon.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::ConfigError;

/// One horizon sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonPoint {
    pub azimuth_deg: f64,
    pub altitude_deg: f64,
}

/// Obstruction altitude as a function of azimuth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonProfile {
    /// Sorted by azimuth, all azimuths in `[0, 360)`
    points: Vec<HorizonPoint>,
}

impl HorizonProfile {
    /// Flat 0° horizon.
    pub fn flat() -> Self {
        Self::default()
    }

    /// Build a profile from samples in any order. Azimuths are normalized.
    pub fn from_points(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let mut points: Vec<HorizonPoint> = points
            .into_iter()
            .map(|(az, alt)| HorizonPoint {
                azimuth_deg: az.rem_euclid(360.0),
                altitude_deg: alt,
            })
            .collect();
        points.sort_by(|a, b| a.azimuth_deg.total_cmp(&b.azimuth_deg));
        Self { points }
    }

    /// Parse the common text format: one `azimuth altitude` pair per line,
    /// `#` starts a comment, blank lines are ignored.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut samples = Vec::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(az), Some(alt), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(ConfigError::Invalid(format!(
                    "horizon line {}: expected 'azimuth altitude', got '{}'",
                    lineno + 1,
                    line
                )));
            };
            let parse = |s: &str| {
                s.parse::<f64>().ok().filter(|v| v.is_finite()).ok_or_else(|| {
                    ConfigError::Invalid(format!("horizon line {}: bad number '{}'", lineno + 1, s))
                })
            };
            samples.push((parse(az)?, parse(alt)?));
        }
        Ok(Self::from_points(samples))
    }

    /// Read and parse a horizon file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn is_flat(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[HorizonPoint] {
        &self.points
    }

    /// Horizon altitude at an azimuth.
    pub fn altitude_at(&self, azimuth_deg: f64) -> f64 {
        let n = self.points.len();
        match n {
            0 => return 0.0,
            1 => return self.points[0].altitude_deg,
            _ => {}
        }

        let az = azimuth_deg.rem_euclid(360.0);
        let idx = self.points.partition_point(|p| p.azimuth_deg <= az);

        let (lo_az, lo_alt) = if idx == 0 {
            let last = self.points[n - 1];
            (last.azimuth_deg - 360.0, last.altitude_deg)
        } else {
            let p = self.points[idx - 1];
            (p.azimuth_deg, p.altitude_deg)
        };
        let (hi_az, hi_alt) = if idx == n {
            let first = self.points[0];
            (first.azimuth_deg + 360.0, first.altitude_deg)
        } else {
            let p = self.points[idx];
            (p.azimuth_deg, p.altitude_deg)
        };

        let span = hi_az - lo_az;
        if span <= f64::EPSILON {
            return lo_alt;
        }
        lo_alt + (hi_alt - lo_alt) * (az - lo_az) / span
    }

    /// Whether a position is strictly below the local horizon.
    pub fn is_below(&self, altitude_deg: f64, azimuth_deg: f64) -> bool {
        altitude_deg < self.altitude_at(azimuth_deg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_flat_profile() {
        let h = HorizonProfile::flat();
        assert_eq!(h.altitude_at(123.0), 0.0);
        assert!(!h.is_below(0.0, 10.0));
        assert!(h.is_below(-0.1, 10.0));
    }

    #[test]
    fn test_interpolates_between_samples() {
        let h = HorizonProfile::from_points([(90.0, 10.0), (180.0, 30.0)]);
        assert_abs_diff_eq!(h.altitude_at(135.0), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.altitude_at(90.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wraps_through_north() {
        let h = HorizonProfile::from_points([(350.0, 20.0), (10.0, 40.0)]);
        assert_abs_diff_eq!(h.altitude_at(0.0), 30.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.altitude_at(355.0), 25.0, epsilon = 1e-12);
        assert_abs_diff_eq!(h.altitude_at(360.0), 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_text_format() {
        let text = "# az alt\n0 5\n\n90 15 # trees\n180 5\n270 5\n";
        let h = HorizonProfile::parse(text).unwrap();
        assert_eq!(h.points().len(), 4);
        assert_abs_diff_eq!(h.altitude_at(45.0), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(HorizonProfile::parse("0 5 7\n").is_err());
        assert!(HorizonProfile::parse("north 5\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("horizon.txt");
        std::fs::write(&path, "0 12\n180 12\n").unwrap();
        let h = HorizonProfile::from_file(&path).unwrap();
        assert_abs_diff_eq!(h.altitude_at(77.0), 12.0, epsilon = 1e-12);
    }
}
