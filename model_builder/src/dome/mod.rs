//! Dome geometry: slit aperture ranges and dome targets for offset mounts.

pub mod geometry;
pub mod target;

use serde::{Deserialize, Serialize};

pub use geometry::{
    aperture_contains, aperture_half_angle, azimuth_distance, compute_aperture_range,
    MAX_APERTURE_HALF_ANGLE_DEG,
};
pub use target::{dome_target, dome_target_from_hour_angle, expected_side_of_pier, MountGeometry};

use crate::astro::horizontal_to_hour_angle;
use crate::models::ModelPoint;

/// Physical dome and mount layout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomeGeometry {
    #[serde(default = "default_radius_mm")]
    pub radius_mm: f64,
    #[serde(flatten)]
    pub mount: MountGeometry,
}

fn default_radius_mm() -> f64 {
    2500.0
}

impl Default for DomeGeometry {
    fn default() -> Self {
        Self {
            radius_mm: default_radius_mm(),
            mount: MountGeometry::default(),
        }
    }
}

impl DomeGeometry {
    /// Fill in the expected side of pier, dome target and, when a slit width is
    /// configured, the aperture bounds of a point.
    pub fn annotate(&self, point: &mut ModelPoint, latitude_deg: f64, shutter_width_mm: f64) {
        let (alt, az) = (point.altitude_deg(), point.azimuth_deg());
        let (ha, _) = horizontal_to_hour_angle(alt, az, latitude_deg);
        point.expected_side_of_pier = expected_side_of_pier(ha);

        let target = dome_target(
            alt,
            az,
            point.expected_side_of_pier,
            latitude_deg,
            &self.mount,
            self.radius_mm,
        );
        point.dome_target_altitude = target.altitude.value();
        point.dome_target_azimuth = target.azimuth.value();

        if shutter_width_mm > 0.0 {
            let (min, max) = compute_aperture_range(
                point.dome_target_altitude,
                point.dome_target_azimuth,
                self.radius_mm,
                shutter_width_mm,
            );
            point.min_dome_azimuth = min;
            point.max_dome_azimuth = max;
        } else {
            point.min_dome_azimuth = f64::NAN;
            point.max_dome_azimuth = f64::NAN;
        }
    }
}

/// Whether a point is unobstructed with the dome at `dome_azimuth`.
///
/// Uses the aperture bounds widened by `tolerance_deg` on each side when
/// present, otherwise a `tolerance_deg` window around the dome target.
pub fn point_visible_from(point: &ModelPoint, dome_azimuth: f64, tolerance_deg: f64) -> bool {
    if point.has_dome_bounds() {
        return aperture_contains(
            point.min_dome_azimuth - tolerance_deg,
            point.max_dome_azimuth + tolerance_deg,
            dome_azimuth,
        );
    }
    let target = if point.dome_target_azimuth.is_finite() {
        point.dome_target_azimuth
    } else {
        point.azimuth_deg()
    };
    dome_azimuth.is_finite() && azimuth_distance(target, dome_azimuth) <= tolerance_deg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ModelPointState, PierSide};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_annotate_with_shutter() {
        let geometry = DomeGeometry::default();
        let mut p = ModelPoint::new(0, 30.0, 100.0, ModelPointState::Generated);
        geometry.annotate(&mut p, 40.0, 1000.0);
        assert_eq!(p.expected_side_of_pier, PierSide::West);
        assert_abs_diff_eq!(p.dome_target_azimuth, 100.0, epsilon = 1e-9);
        assert!(p.has_dome_bounds());
        assert!(p.min_dome_azimuth < 100.0 && p.max_dome_azimuth > 100.0);
    }

    #[test]
    fn test_annotate_without_shutter_leaves_bounds_unset() {
        let geometry = DomeGeometry::default();
        let mut p = ModelPoint::new(0, 30.0, 250.0, ModelPointState::Generated);
        geometry.annotate(&mut p, 40.0, 0.0);
        assert_eq!(p.expected_side_of_pier, PierSide::East);
        assert!(!p.has_dome_bounds());
        assert!(point_visible_from(&p, 253.0, 5.0));
        assert!(!point_visible_from(&p, 260.0, 5.0));
    }

    #[test]
    fn test_visible_uses_bounds() {
        let mut p = ModelPoint::new(0, 30.0, 5.0, ModelPointState::Generated);
        p.min_dome_azimuth = -5.0;
        p.max_dome_azimuth = 15.0;
        assert!(point_visible_from(&p, 358.0, 0.0));
        assert!(!point_visible_from(&p, 20.0, 0.0));
    }

    #[test]
    fn test_tolerance_widens_bounds() {
        let mut p = ModelPoint::new(0, 30.0, 5.0, ModelPointState::Generated);
        p.min_dome_azimuth = -5.0;
        p.max_dome_azimuth = 15.0;
        assert!(!point_visible_from(&p, 18.0, 0.0));
        assert!(point_visible_from(&p, 18.0, 5.0));
        assert!(point_visible_from(&p, 352.0, 5.0));
        assert!(!point_visible_from(&p, 345.0, 5.0));
    }
}
