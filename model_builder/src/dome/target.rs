//! Where the dome must point for an off-centre telescope.
//!
//! Frame is local `(north, east, up)` with the dome centre at the origin and all
//! lengths in millimetres. The optical axis starts at the mount offset displaced
//! along the declination axis by the GEM offset, on the side given by the pier
//! side; its intersection with the dome sphere is the dome target.

use serde::{Deserialize, Serialize};

use crate::astro::{horizontal_to_hour_angle, hour_angle_to_horizontal};
use crate::models::{HorizontalCoordinates, PierSide};

type Vec3 = [f64; 3];

fn dot(a: &Vec3, b: &Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Mount placement relative to the dome centre.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MountGeometry {
    #[serde(default)]
    pub offset_north_mm: f64,
    #[serde(default)]
    pub offset_east_mm: f64,
    #[serde(default)]
    pub offset_up_mm: f64,
    /// Distance from the RA axis to the optical axis along the declination axis
    #[serde(default)]
    pub gem_axis_offset_mm: f64,
}

impl MountGeometry {
    pub fn is_centred(&self) -> bool {
        self.offset_north_mm == 0.0
            && self.offset_east_mm == 0.0
            && self.offset_up_mm == 0.0
            && self.gem_axis_offset_mm == 0.0
    }
}

/// Side of pier a German equatorial mount uses for an hour angle.
pub fn expected_side_of_pier(ha_hours: f64) -> PierSide {
    if ha_hours >= 0.0 {
        PierSide::East
    } else {
        PierSide::West
    }
}

fn unit_from_horizontal(altitude_deg: f64, azimuth_deg: f64) -> Vec3 {
    let alt = altitude_deg.to_radians();
    let az = azimuth_deg.to_radians();
    [alt.cos() * az.cos(), alt.cos() * az.sin(), alt.sin()]
}

/// Declination axis direction at an hour angle, in `(north, east, up)`.
fn declination_axis(ha_hours: f64, latitude_deg: f64) -> Vec3 {
    let lat = latitude_deg.to_radians();
    let h = (ha_hours * 15.0).to_radians();
    // meridian equator point and the east point
    let x_eq = [-lat.sin(), 0.0, lat.cos()];
    let y_eq = [0.0, 1.0, 0.0];
    [
        h.sin() * x_eq[0] + h.cos() * y_eq[0],
        h.sin() * x_eq[1] + h.cos() * y_eq[1],
        h.sin() * x_eq[2] + h.cos() * y_eq[2],
    ]
}

/// Dome altitude / azimuth framing a telescope pointing.
///
/// With a centred mount this is the telescope position itself. If the optical
/// axis origin lies outside the dome the telescope position is returned.
pub fn dome_target(
    altitude_deg: f64,
    azimuth_deg: f64,
    side: PierSide,
    latitude_deg: f64,
    mount: &MountGeometry,
    dome_radius_mm: f64,
) -> HorizontalCoordinates {
    let direction = unit_from_horizontal(altitude_deg, azimuth_deg);
    let (ha, _dec) = horizontal_to_hour_angle(altitude_deg, azimuth_deg, latitude_deg);
    let sign = match side {
        PierSide::East => 1.0,
        PierSide::West => -1.0,
        PierSide::Unknown => 0.0,
    };
    let axis = declination_axis(ha, latitude_deg);
    let l = sign * mount.gem_axis_offset_mm;
    let origin = [
        mount.offset_north_mm + l * axis[0],
        mount.offset_east_mm + l * axis[1],
        mount.offset_up_mm + l * axis[2],
    ];

    let b = dot(&origin, &direction);
    let c = dot(&origin, &origin) - dome_radius_mm * dome_radius_mm;
    let disc = b * b - c;
    if dome_radius_mm <= 0.0 || disc < 0.0 || c > 0.0 {
        return HorizontalCoordinates::new(altitude_deg, azimuth_deg);
    }
    let t = -b + disc.sqrt();
    let hit = [
        origin[0] + t * direction[0],
        origin[1] + t * direction[1],
        origin[2] + t * direction[2],
    ];
    let az = hit[1].atan2(hit[0]).to_degrees().rem_euclid(360.0);
    let alt = (hit[2] / dome_radius_mm).clamp(-1.0, 1.0).asin().to_degrees();
    HorizontalCoordinates::new(alt, az)
}

/// Dome target for an equatorial pointing.
pub fn dome_target_from_hour_angle(
    ha_hours: f64,
    dec_deg: f64,
    side: PierSide,
    latitude_deg: f64,
    mount: &MountGeometry,
    dome_radius_mm: f64,
) -> HorizontalCoordinates {
    let h = hour_angle_to_horizontal(ha_hours, dec_deg, latitude_deg);
    dome_target(
        h.altitude.value(),
        h.azimuth.value(),
        side,
        latitude_deg,
        mount,
        dome_radius_mm,
    )
}
