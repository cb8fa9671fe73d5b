//! Dome slit aperture.

/// Half-width used when the slit formula is undefined (target near zenith or a
/// slit wider than the projected dome).
pub const MAX_APERTURE_HALF_ANGLE_DEG: f64 = 45.0;

/// Half of the azimuth range over which a slit of `shutter_width` keeps a target
/// at `altitude_deg` unobstructed.
pub fn aperture_half_angle(altitude_deg: f64, dome_radius: f64, shutter_width: f64) -> f64 {
    let ratio = shutter_width / (2.0 * dome_radius * altitude_deg.to_radians().cos());
    let half = ratio.asin().to_degrees();
    if half.is_finite() {
        half.min(MAX_APERTURE_HALF_ANGLE_DEG)
    } else {
        MAX_APERTURE_HALF_ANGLE_DEG
    }
}

/// Dome azimuth range keeping a target unobstructed.
///
/// Returns `(azimuth - half, azimuth + half)` without normalization, so the
/// range may extend below 0° or beyond 360°. `dome_radius` and `shutter_width`
/// share a unit.
pub fn compute_aperture_range(
    altitude_deg: f64,
    azimuth_deg: f64,
    dome_radius: f64,
    shutter_width: f64,
) -> (f64, f64) {
    let half = aperture_half_angle(altitude_deg, dome_radius, shutter_width);
    (azimuth_deg - half, azimuth_deg + half)
}

/// Whether a dome azimuth lies inside an aperture range, modulo 360°.
pub fn aperture_contains(min_azimuth: f64, max_azimuth: f64, dome_azimuth: f64) -> bool {
    if !(min_azimuth.is_finite() && max_azimuth.is_finite() && dome_azimuth.is_finite()) {
        return false;
    }
    let width = max_azimuth - min_azimuth;
    if width >= 360.0 {
        return true;
    }
    (dome_azimuth - min_azimuth).rem_euclid(360.0) <= width
}

/// Smallest angle between two azimuths, in `[0, 180]`.
pub fn azimuth_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_horizon_aperture() {
        // 1 m slit in a 2 m radius dome at the horizon: asin(0.25)
        let (min, max) = compute_aperture_range(0.0, 100.0, 2000.0, 1000.0);
        let half = 0.25f64.asin().to_degrees();
        assert_abs_diff_eq!(min, 100.0 - half, epsilon = 1e-9);
        assert_abs_diff_eq!(max, 100.0 + half, epsilon = 1e-9);
    }

    #[test]
    fn test_aperture_widens_with_altitude() {
        let low = aperture_half_angle(10.0, 2000.0, 800.0);
        let high = aperture_half_angle(60.0, 2000.0, 800.0);
        assert!(high > low);
    }

    #[test]
    fn test_undefined_aperture_is_capped() {
        let capped = MAX_APERTURE_HALF_ANGLE_DEG;
        assert_eq!(aperture_half_angle(90.0, 2000.0, 800.0), capped);
        assert_eq!(aperture_half_angle(85.0, 2000.0, 800.0), capped);
    }

    #[test]
    fn test_range_is_not_normalized() {
        let (min, max) = compute_aperture_range(0.0, 2.0, 2000.0, 1000.0);
        assert!(min < 0.0);
        assert!(max > 0.0);
    }

    #[test]
    fn test_contains_wraps() {
        assert!(aperture_contains(-10.0, 10.0, 355.0));
        assert!(aperture_contains(-10.0, 10.0, 5.0));
        assert!(!aperture_contains(-10.0, 10.0, 20.0));
        assert!(aperture_contains(350.0, 370.0, 5.0));
        assert!(!aperture_contains(f64::NAN, f64::NAN, 5.0));
    }

    #[test]
    fn test_azimuth_distance() {
        assert_eq!(azimuth_distance(350.0, 10.0), 20.0);
        assert_eq!(azimuth_distance(10.0, 190.0), 180.0);
    }
}
