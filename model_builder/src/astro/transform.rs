//! Sidereal time, equatorial/horizontal conversion and atmospheric refraction.
//!
//! Angles cross this API in degrees (hour angle and RA in hours); radians are an
//! internal detail. Azimuth is measured from north through east.

use crate::models::{EquatorialCoordinates, HorizontalCoordinates, ModifiedJulianDate};

use super::{AtmosphericConditions, ObserverSite};

/// Ratio of a mean solar interval to the equivalent sidereal interval.
pub const SIDEREAL_TO_SOLAR: f64 = 0.997_269_57;

const ARCSEC_PER_DEG: f64 = 3600.0;

/// Greenwich mean sidereal time in hours, `[0, 24)`.
pub fn greenwich_mean_sidereal_time(mjd: ModifiedJulianDate) -> f64 {
    let d = mjd.days_since_j2000();
    (18.697_374_558 + 24.065_709_824_419_08 * d).rem_euclid(24.0)
}

/// Local mean sidereal time in hours for an east-positive longitude.
pub fn local_sidereal_time(mjd: ModifiedJulianDate, longitude_deg: f64) -> f64 {
    (greenwich_mean_sidereal_time(mjd) + longitude_deg / 15.0).rem_euclid(24.0)
}

/// Hour angle in hours, wrapped into `(-12, 12]`.
pub fn hour_angle(lst_hours: f64, ra_hours: f64) -> f64 {
    crate::models::wrap_hours_signed(lst_hours - ra_hours)
}

/// Convert hour angle / declination to altitude / azimuth for the given latitude.
pub fn hour_angle_to_horizontal(
    ha_hours: f64,
    dec_deg: f64,
    latitude_deg: f64,
) -> HorizontalCoordinates {
    let h = (ha_hours * 15.0).to_radians();
    let dec = dec_deg.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_alt = lat.sin() * dec.sin() + lat.cos() * dec.cos() * h.cos();
    let alt = sin_alt.clamp(-1.0, 1.0).asin();
    let az = (-dec.cos() * h.sin()).atan2(dec.sin() * lat.cos() - dec.cos() * lat.sin() * h.cos());

    HorizontalCoordinates::new(alt.to_degrees(), az.to_degrees().rem_euclid(360.0))
}

/// Convert altitude / azimuth to `(hour angle hours, declination degrees)`.
pub fn horizontal_to_hour_angle(
    altitude_deg: f64,
    azimuth_deg: f64,
    latitude_deg: f64,
) -> (f64, f64) {
    let alt = altitude_deg.to_radians();
    let az = azimuth_deg.to_radians();
    let lat = latitude_deg.to_radians();

    let sin_dec = lat.sin() * alt.sin() + lat.cos() * alt.cos() * az.cos();
    let dec = sin_dec.clamp(-1.0, 1.0).asin();
    let h = (-az.sin() * alt.cos()).atan2(alt.sin() * lat.cos() - alt.cos() * lat.sin() * az.cos());

    (
        crate::models::wrap_hours_signed(h.to_degrees() / 15.0),
        dec.to_degrees(),
    )
}

/// Topocentric altitude / azimuth of a fixed target at a given instant.
pub fn equatorial_to_horizontal(
    target: &EquatorialCoordinates,
    site: &ObserverSite,
    mjd: ModifiedJulianDate,
) -> HorizontalCoordinates {
    let lst = local_sidereal_time(mjd, site.longitude_deg);
    let ha = hour_angle(lst, target.ra_hours);
    hour_angle_to_horizontal(ha, target.dec_deg, site.latitude_deg)
}

/// Equatorial coordinates of an altitude / azimuth, using a supplied sidereal time.
pub fn horizontal_to_equatorial(
    altitude_deg: f64,
    azimuth_deg: f64,
    latitude_deg: f64,
    lst_hours: f64,
) -> EquatorialCoordinates {
    let (ha, dec) = horizontal_to_hour_angle(altitude_deg, azimuth_deg, latitude_deg);
    EquatorialCoordinates::new(lst_hours - ha, dec)
}

/// Bennett refraction for an apparent altitude, in degrees.
///
/// Scaled by pressure and temperature. Zero below -1° where the formula diverges.
pub fn refraction_from_apparent(apparent_alt_deg: f64, conditions: &AtmosphericConditions) -> f64 {
    if apparent_alt_deg < -1.0 {
        return 0.0;
    }
    let arg = (apparent_alt_deg + 7.31 / (apparent_alt_deg + 4.4)).to_radians();
    let arcmin = 1.0 / arg.tan();
    (arcmin / 60.0) * conditions.scale()
}

/// Saemundsson refraction for a true (airless) altitude, in degrees.
pub fn refraction_from_true(true_alt_deg: f64, conditions: &AtmosphericConditions) -> f64 {
    if true_alt_deg < -1.0 {
        return 0.0;
    }
    let arg = (true_alt_deg + 10.3 / (true_alt_deg + 5.11)).to_radians();
    let arcmin = 1.02 / arg.tan();
    (arcmin / 60.0) * conditions.scale()
}

/// Remove refraction from an observed altitude.
pub fn apparent_to_true_altitude(apparent_alt_deg: f64, conditions: &AtmosphericConditions) -> f64 {
    apparent_alt_deg - refraction_from_apparent(apparent_alt_deg, conditions)
}

/// Add refraction to an airless altitude.
pub fn true_to_apparent_altitude(true_alt_deg: f64, conditions: &AtmosphericConditions) -> f64 {
    (true_alt_deg + refraction_from_true(true_alt_deg, conditions)).min(90.0)
}

/// Great-circle separation between two equatorial positions, in arcseconds.
pub fn angular_separation_arcsec(a: &EquatorialCoordinates, b: &EquatorialCoordinates) -> f64 {
    let ra1 = (a.ra_hours * 15.0).to_radians();
    let ra2 = (b.ra_hours * 15.0).to_radians();
    let d1 = a.dec_deg.to_radians();
    let d2 = b.dec_deg.to_radians();

    // Vincenty form, stable for both tiny and antipodal separations.
    let dra = ra2 - ra1;
    let num = ((d2.cos() * dra.sin()).powi(2)
        + (d1.cos() * d2.sin() - d1.sin() * d2.cos() * dra.cos()).powi(2))
    .sqrt();
    let den = d1.sin() * d2.sin() + d1.cos() * d2.cos() * dra.cos();
    num.atan2(den).to_degrees() * ARCSEC_PER_DEG
}
