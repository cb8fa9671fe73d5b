//! Configuration file support.
//!
//! Build options and the site, dome, capture and generation settings are read
//! from a TOML file, `model_builder.toml` by default. Every field has a default,
//! so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::astro::{AtmosphericConditions, HorizonProfile, ObserverSite};
use crate::dome::DomeGeometry;
use crate::error::ConfigError;
use crate::generator::{MeridianLimits, PointBounds};

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV_VAR: &str = "MODEL_BUILDER_CONFIG";

/// Immutable per-build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Extra iterations after the first
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,
    /// Residual ceiling per point, arcseconds
    #[serde(default = "default_max_point_rms")]
    pub max_point_rms: f64,
    /// Concurrent solve-and-register units; `<= 0` removes the limit
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: i32,
    /// Dome slit width; `0` means no slit geometry, use the azimuth tolerance
    #[serde(default)]
    pub dome_shutter_width_mm: f64,
    #[serde(default)]
    pub sync_first_point: bool,
    #[serde(default)]
    pub west_to_east_sorting: bool,
    #[serde(default = "default_true")]
    pub minimize_dome_movement: bool,
    #[serde(default)]
    pub minimize_meridian_flips: bool,
    /// Failures above this trigger a full restart instead of an incremental retry
    #[serde(default = "default_max_failed_points")]
    pub max_failed_points: usize,
    #[serde(default)]
    pub alternate_directions_between_iterations: bool,
    #[serde(default = "default_subframe_fraction")]
    pub plate_solve_subframe_fraction: f64,
    /// Turn the mount's refraction correction off for the duration of the build
    #[serde(default)]
    pub disable_refraction_correction: bool,
    /// Drop points above the residual ceiling and refit once at the end
    #[serde(default)]
    pub remove_high_rms_points_after_build: bool,
    #[serde(default = "default_dome_tolerance")]
    pub dome_azimuth_tolerance_deg: f64,
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Camera filter used for captures; the current filter is kept when unset
    #[serde(default)]
    pub model_filter: Option<String>,
}

fn default_num_retries() -> u32 {
    2
}

fn default_max_point_rms() -> f64 {
    10.0
}

fn default_max_concurrency() -> i32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_max_failed_points() -> usize {
    3
}

fn default_subframe_fraction() -> f64 {
    1.0
}

fn default_dome_tolerance() -> f64 {
    5.0
}

fn default_progress_interval_ms() -> u64 {
    1000
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            num_retries: default_num_retries(),
            max_point_rms: default_max_point_rms(),
            max_concurrency: default_max_concurrency(),
            dome_shutter_width_mm: 0.0,
            sync_first_point: false,
            west_to_east_sorting: false,
            minimize_dome_movement: true,
            minimize_meridian_flips: false,
            max_failed_points: default_max_failed_points(),
            alternate_directions_between_iterations: false,
            plate_solve_subframe_fraction: default_subframe_fraction(),
            disable_refraction_correction: false,
            remove_high_rms_points_after_build: false,
            dome_azimuth_tolerance_deg: default_dome_tolerance(),
            progress_interval_ms: default_progress_interval_ms(),
            model_filter: None,
        }
    }
}

impl BuildOptions {
    /// Permits for the processing limiter.
    pub fn concurrency_limit(&self) -> usize {
        if self.max_concurrency <= 0 {
            tokio::sync::Semaphore::MAX_PERMITS
        } else {
            self.max_concurrency as usize
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_point_rms.is_finite() && self.max_point_rms > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_point_rms must be positive, got {}",
                self.max_point_rms
            )));
        }
        if !(self.plate_solve_subframe_fraction > 0.0 && self.plate_solve_subframe_fraction <= 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "plate_solve_subframe_fraction must be in (0, 1], got {}",
                self.plate_solve_subframe_fraction
            )));
        }
        if self.dome_shutter_width_mm < 0.0 || !self.dome_shutter_width_mm.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "dome_shutter_width_mm must be >= 0, got {}",
                self.dome_shutter_width_mm
            )));
        }
        if !(self.dome_azimuth_tolerance_deg >= 0.0 && self.dome_azimuth_tolerance_deg < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "dome_azimuth_tolerance_deg must be in [0, 180), got {}",
                self.dome_azimuth_tolerance_deg
            )));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigError::Invalid("progress_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Exposure and solve settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    #[serde(default = "default_exposure_secs")]
    pub exposure_secs: f64,
    #[serde(default = "default_binning")]
    pub binning: u32,
    #[serde(default)]
    pub gain: Option<i32>,
    #[serde(default = "default_search_radius")]
    pub solve_search_radius_deg: f64,
}

fn default_exposure_secs() -> f64 {
    2.0
}

fn default_binning() -> u32 {
    2
}

fn default_search_radius() -> f64 {
    10.0
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            exposure_secs: default_exposure_secs(),
            binning: default_binning(),
            gain: None,
            solve_search_radius_deg: default_search_radius(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStrategy {
    #[default]
    GoldenSpiral,
    SiderealPath,
}

/// How the point list is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    #[serde(default)]
    pub strategy: GenerationStrategy,
    #[serde(default = "default_num_points")]
    pub num_points: usize,
    /// Sidereal path target right ascension, hours
    #[serde(default)]
    pub target_ra_hours: f64,
    /// Sidereal path target declination, degrees
    #[serde(default)]
    pub target_dec_deg: f64,
    #[serde(default = "default_ra_delta_deg")]
    pub ra_delta_deg: f64,
    /// Sidereal path window length from now
    #[serde(default = "default_path_hours")]
    pub path_hours: f64,
}

fn default_num_points() -> usize {
    20
}

fn default_ra_delta_deg() -> f64 {
    1.5
}

fn default_path_hours() -> f64 {
    4.0
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            strategy: GenerationStrategy::default(),
            num_points: default_num_points(),
            target_ra_hours: 0.0,
            target_dec_deg: 0.0,
            ra_delta_deg: default_ra_delta_deg(),
            path_hours: default_path_hours(),
        }
    }
}

/// Horizon profile source. `file` wins over inline `points`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonSettings {
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Inline `[azimuth, altitude]` pairs
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
}

/// Simulator knobs for the demo binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorSettings {
    #[serde(default = "default_lst_hours")]
    pub lst_hours: f64,
    #[serde(default)]
    pub pointing_error_ra_arcsec: f64,
    #[serde(default)]
    pub pointing_error_dec_arcsec: f64,
    #[serde(default)]
    pub slew_delay_ms: u64,
    #[serde(default)]
    pub capture_delay_ms: u64,
    #[serde(default)]
    pub solve_delay_ms: u64,
    #[serde(default)]
    pub with_dome: bool,
    #[serde(default)]
    pub dome_latency_ms: u64,
    #[serde(default)]
    pub dome_start_azimuth_deg: f64,
    /// Upper end of simulated residuals
    #[serde(default = "default_residual_scale")]
    pub residual_scale_arcsec: f64,
}

fn default_lst_hours() -> f64 {
    6.0
}

fn default_residual_scale() -> f64 {
    8.0
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            lst_hours: default_lst_hours(),
            pointing_error_ra_arcsec: 0.0,
            pointing_error_dec_arcsec: 0.0,
            slew_delay_ms: 0,
            capture_delay_ms: 0,
            solve_delay_ms: 0,
            with_dome: false,
            dome_latency_ms: 0,
            dome_start_azimuth_deg: 0.0,
            residual_scale_arcsec: default_residual_scale(),
        }
    }
}

/// Complete configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelBuilderConfig {
    #[serde(default)]
    pub build: BuildOptions,
    #[serde(default)]
    pub site: ObserverSite,
    #[serde(default)]
    pub atmosphere: AtmosphericConditions,
    #[serde(default)]
    pub bounds: PointBounds,
    #[serde(default)]
    pub meridian_limits: MeridianLimits,
    #[serde(default)]
    pub dome: DomeGeometry,
    #[serde(default)]
    pub capture: CaptureSettings,
    #[serde(default)]
    pub generation: GenerationSettings,
    #[serde(default)]
    pub horizon: HorizonSettings,
    #[serde(default)]
    pub simulator: SimulatorSettings,
}

impl ModelBuilderConfig {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: ModelBuilderConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(ModelBuilderConfig)` if successful
    /// * `Err(ConfigError)` if the file cannot be read, parsed or validated
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        // relative horizon files are relative to the config file
        if let (Some(file), Some(dir)) = (&config.horizon.file, path.as_ref().parent()) {
            if file.is_relative() {
                config.horizon.file = Some(dir.join(file));
            }
        }
        Ok(config)
    }

    /// Load configuration from the default location.
    ///
    /// Searches for `model_builder.toml` in:
    /// 1. Current directory
    /// 2. `model_builder/` directory
    /// 3. Parent directory
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let search_paths = [
            PathBuf::from("model_builder.toml"),
            PathBuf::from("model_builder/model_builder.toml"),
            PathBuf::from("../model_builder.toml"),
        ];

        for path in search_paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(ConfigError::NotFound)
    }

    /// Load from `MODEL_BUILDER_CONFIG` if set, else the default location, else
    /// built-in defaults.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(path);
        }
        match Self::from_default_location() {
            Err(ConfigError::NotFound) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build.validate()?;
        if !(-90.0..=90.0).contains(&self.site.latitude_deg) {
            return Err(ConfigError::Invalid(format!(
                "site latitude must be in [-90, 90], got {}",
                self.site.latitude_deg
            )));
        }
        if self.bounds.min_altitude_deg > self.bounds.max_altitude_deg {
            return Err(ConfigError::Invalid(format!(
                "min_altitude_deg {} exceeds max_altitude_deg {}",
                self.bounds.min_altitude_deg, self.bounds.max_altitude_deg
            )));
        }
        if self.dome.radius_mm <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "dome radius must be positive, got {}",
                self.dome.radius_mm
            )));
        }
        if self.capture.binning == 0 {
            return Err(ConfigError::Invalid("binning must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Resolve the configured horizon profile.
    pub fn horizon_profile(&self) -> Result<HorizonProfile, ConfigError> {
        match &self.horizon.file {
            Some(file) => HorizonProfile::from_file(file),
            None => Ok(HorizonProfile::from_points(
                self.horizon.points.iter().map(|[az, alt]| (*az, *alt)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = ModelBuilderConfig::from_toml_str("").unwrap();
        assert_eq!(config.build, BuildOptions::default());
        assert_eq!(config.build.progress_interval_ms, 1000);
        assert_eq!(config.build.dome_azimuth_tolerance_deg, 5.0);
        assert_eq!(config.dome.radius_mm, 2500.0);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[build]
num_retries = 0
max_point_rms = 5.0
max_concurrency = 2
dome_shutter_width_mm = 900.0
sync_first_point = true
model_filter = "L"

[site]
latitude_deg = -33.5
longitude_deg = 151.2

[dome]
radius_mm = 3000.0
offset_north_mm = 120.0
gem_axis_offset_mm = 350.0

[meridian_limits]
east_deg = 5.0
west_deg = 10.0

[horizon]
points = [[0.0, 10.0], [180.0, 20.0]]
"#;
        let config = ModelBuilderConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.build.num_retries, 0);
        assert_eq!(config.build.model_filter.as_deref(), Some("L"));
        assert_eq!(config.site.latitude_deg, -33.5);
        assert_eq!(config.dome.mount.offset_north_mm, 120.0);
        assert_eq!(config.dome.mount.gem_axis_offset_mm, 350.0);
        assert_eq!(config.meridian_limits.west_deg, 10.0);
        let horizon = config.horizon_profile().unwrap();
        assert_eq!(horizon.altitude_at(90.0), 15.0);
    }

    #[test]
    fn test_concurrency_limit() {
        let mut options = BuildOptions::default();
        options.max_concurrency = 4;
        assert_eq!(options.concurrency_limit(), 4);
        let unbounded = tokio::sync::Semaphore::MAX_PERMITS;
        options.max_concurrency = 0;
        assert_eq!(options.concurrency_limit(), unbounded);
        options.max_concurrency = -1;
        assert_eq!(options.concurrency_limit(), unbounded);
    }

    fn rejection(toml: &str) -> ConfigError {
        ModelBuilderConfig::from_toml_str(toml).unwrap_err()
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = rejection("[build]\nmax_point_rms = 0.0\n");
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = rejection("[build]\nplate_solve_subframe_fraction = 1.5\n");
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = rejection("[build]\nnum_retries = \"two\"\n");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_from_file_resolves_relative_horizon() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("horizon.txt"), "0 25\n180 25\n").unwrap();
        let path = dir.path().join("model_builder.toml");
        std::fs::write(&path, "[horizon]\nfile = \"horizon.txt\"\n").unwrap();

        let config = ModelBuilderConfig::from_file(&path).unwrap();
        assert_eq!(config.horizon.file, Some(dir.path().join("horizon.txt")));
        assert_eq!(config.horizon_profile().unwrap().altitude_at(45.0), 25.0);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = ModelBuilderConfig::from_file("/nonexistent/model_builder.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
