//! Collaborator interfaces: mount, camera, dome, plate solver and alignment engine.
//!
//! The orchestrator only talks to hardware and numerical engines through these
//! traits. Every call can fail with a [`DeviceError`](crate::error::DeviceError);
//! whether that failure ends the build is the orchestrator's decision.

#[cfg(feature = "simulator")]
pub mod sim;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DeviceResult;
use crate::models::{EquatorialCoordinates, PierSide};

/// Mount control surface.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; the orchestrator shares them across tasks.
#[async_trait]
pub trait Telescope: Send + Sync {
    async fn is_connected(&self) -> DeviceResult<bool>;

    /// Current reported position (mount frame, JNow).
    async fn coordinates(&self) -> DeviceResult<EquatorialCoordinates>;

    /// Local sidereal time according to the mount, in hours.
    async fn sidereal_time(&self) -> DeviceResult<f64>;

    async fn side_of_pier(&self) -> DeviceResult<PierSide>;

    async fn is_parked(&self) -> DeviceResult<bool>;

    async fn park(&self) -> DeviceResult<()>;

    async fn unpark(&self) -> DeviceResult<()>;

    /// Slew and wait for the mount to settle. `Ok(false)` when the mount refused.
    async fn slew_to_coordinates(&self, target: EquatorialCoordinates) -> DeviceResult<bool>;

    /// Whether the mount applies its own refraction correction to targets.
    async fn refraction_correction(&self) -> DeviceResult<bool>;

    async fn set_refraction_correction(&self, enabled: bool) -> DeviceResult<()>;
}

/// Exposure parameters for one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureRequest {
    pub exposure_secs: f64,
    pub binning: u32,
    pub gain: Option<i32>,
    /// Fraction of the sensor read out, centred. 1.0 is the full frame.
    pub subframe_fraction: f64,
}

/// An exposure as handed to the plate solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub binning: u32,
    pub exposure_secs: f64,
    pub captured_at: DateTime<Utc>,
    /// FITS-style header cards
    pub headers: BTreeMap<String, String>,
}

impl CapturedImage {
    pub fn header_f64(&self, key: &str) -> Option<f64> {
        self.headers.get(key).and_then(|v| v.parse().ok())
    }
}

#[async_trait]
pub trait Camera: Send + Sync {
    async fn is_connected(&self) -> DeviceResult<bool>;

    async fn capture(&self, request: &ExposureRequest) -> DeviceResult<CapturedImage>;

    async fn current_filter(&self) -> DeviceResult<Option<String>>;

    async fn set_filter(&self, filter: Option<String>) -> DeviceResult<()>;
}

#[async_trait]
pub trait Dome: Send + Sync {
    async fn is_connected(&self) -> DeviceResult<bool>;

    async fn can_set_azimuth(&self) -> DeviceResult<bool>;

    /// Rotate and wait for the dome to stop. `Ok(false)` when the dome refused.
    async fn slew_to_azimuth(&self, azimuth_deg: f64) -> DeviceResult<bool>;

    async fn is_slewing(&self) -> DeviceResult<bool>;

    async fn azimuth(&self) -> DeviceResult<f64>;

    async fn follow_enabled(&self) -> DeviceResult<bool>;

    async fn set_follow(&self, enabled: bool) -> DeviceResult<()>;
}

/// Plate solve hints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveParams {
    pub hint: EquatorialCoordinates,
    pub search_radius_deg: f64,
}

/// Result of a plate solve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolveOutcome {
    pub success: bool,
    pub coordinates: Option<EquatorialCoordinates>,
}

impl SolveOutcome {
    pub fn solved(coordinates: EquatorialCoordinates) -> Self {
        Self {
            success: true,
            coordinates: Some(coordinates),
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            coordinates: None,
        }
    }

    /// Coordinates, only when the solve succeeded.
    pub fn position(&self) -> Option<EquatorialCoordinates> {
        if self.success {
            self.coordinates
        } else {
            None
        }
    }
}

#[async_trait]
pub trait PlateSolver: Send + Sync {
    async fn solve(
        &self,
        image: &CapturedImage,
        params: &SolveParams,
    ) -> DeviceResult<SolveOutcome>;
}

/// One correspondence registered with the alignment engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentStar {
    pub point_id: usize,
    /// Where the mount believed it was pointing
    pub mount: EquatorialCoordinates,
    /// Where the image says it was pointing
    pub solved: EquatorialCoordinates,
    pub local_sidereal_time_hours: f64,
    pub side_of_pier: PierSide,
    pub captured_at: DateTime<Utc>,
}

/// Residual of one registered star in a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointResidual {
    pub model_index: i32,
    pub residual_arcsec: f64,
}

/// Fitted pointing model as reported by the alignment engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub rms_arcsec: f64,
    pub residuals: Vec<PointResidual>,
}

impl FittedModel {
    pub fn residual_for(&self, model_index: i32) -> Option<f64> {
        self.residuals
            .iter()
            .find(|r| r.model_index == model_index)
            .map(|r| r.residual_arcsec)
    }

    pub fn point_count(&self) -> usize {
        self.residuals.len()
    }
}

/// Pointing-model engine. Implementations need not tolerate concurrent mutation;
/// the orchestrator serializes every call.
#[async_trait]
pub trait AlignmentModel: Send + Sync {
    async fn delete_alignment(&self) -> DeviceResult<()>;

    async fn start_new_spec(&self) -> DeviceResult<bool>;

    /// Register a star. Returns its model index, `<= 0` when rejected.
    async fn add_point(&self, star: &AlignmentStar) -> DeviceResult<i32>;

    async fn finish_spec(&self) -> DeviceResult<bool>;

    async fn fitted_model(&self) -> DeviceResult<FittedModel>;
}

/// Collaborators injected into a build.
#[derive(Clone)]
pub struct Devices {
    pub telescope: Arc<dyn Telescope>,
    pub camera: Arc<dyn Camera>,
    pub dome: Option<Arc<dyn Dome>>,
    pub solver: Arc<dyn PlateSolver>,
    pub alignment: Arc<dyn AlignmentModel>,
}

impl std::fmt::Debug for Devices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Devices")
            .field("dome", &self.dome.is_some())
            .finish_non_exhaustive()
    }
}
