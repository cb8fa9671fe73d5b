//! Positional astronomy needed to plan and execute a build.

pub mod horizon;
pub mod transform;

use serde::{Deserialize, Serialize};

pub use horizon::{HorizonPoint, HorizonProfile};
pub use transform::{
    angular_separation_arcsec, apparent_to_true_altitude, equatorial_to_horizontal,
    greenwich_mean_sidereal_time, horizontal_to_equatorial, horizontal_to_hour_angle, hour_angle,
    hour_angle_to_horizontal, local_sidereal_time, true_to_apparent_altitude, SIDEREAL_TO_SOLAR,
};

/// Observer location. Longitude is east-positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObserverSite {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    #[serde(default)]
    pub elevation_m: f64,
}

impl ObserverSite {
    pub fn new(latitude_deg: f64, longitude_deg: f64) -> Self {
        Self {
            latitude_deg,
            longitude_deg,
            elevation_m: 0.0,
        }
    }

    pub fn is_northern(&self) -> bool {
        self.latitude_deg >= 0.0
    }

    /// Azimuth of the meridian the mount flips across.
    pub fn meridian_azimuth(&self) -> f64 {
        if self.is_northern() {
            180.0
        } else {
            0.0
        }
    }
}

impl Default for ObserverSite {
    fn default() -> Self {
        Self::new(40.0, 0.0)
    }
}

/// Air pressure and temperature used to scale refraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtmosphericConditions {
    #[serde(default = "default_pressure_hpa")]
    pub pressure_hpa: f64,
    #[serde(default = "default_temperature_c")]
    pub temperature_c: f64,
}

fn default_pressure_hpa() -> f64 {
    1010.0
}

fn default_temperature_c() -> f64 {
    10.0
}

impl AtmosphericConditions {
    /// Multiplier relative to the 1010 hPa / 10 °C reference atmosphere.
    pub fn scale(&self) -> f64 {
        (self.pressure_hpa / 1010.0) * (283.0 / (273.0 + self.temperature_c))
    }
}

impl Default for AtmosphericConditions {
    fn default() -> Self {
        Self {
            pressure_hpa: default_pressure_hpa(),
            temperature_c: default_temperature_c(),
        }
    }
}
