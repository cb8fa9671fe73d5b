//! Alignment point generation.
//!
//! Two strategies share one classifier:
//! - [`golden_spiral`]: near-uniform hemisphere coverage for a general model.
//! - [`sidereal_path`]: samples along one target's path for a local model.

pub mod classify;
pub mod golden_spiral;
pub mod sidereal_path;

pub use classify::{classify, PointBounds};
pub use sidereal_path::{MeridianLimits, SiderealPath, SiderealPathRequest, MAX_PATH_POINTS};

use crate::astro::HorizonProfile;
use crate::error::GeneratorError;
use crate::models::ModelPoint;

/// Point generator bound to one sky window and horizon.
#[derive(Debug, Clone, Default)]
pub struct PointGenerator {
    bounds: PointBounds,
    horizon: HorizonProfile,
}

impl PointGenerator {
    pub fn new(bounds: PointBounds, horizon: HorizonProfile) -> Self {
        Self { bounds, horizon }
    }

    pub fn bounds(&self) -> &PointBounds {
        &self.bounds
    }

    pub fn horizon(&self) -> &HorizonProfile {
        &self.horizon
    }

    /// Golden-spiral points, `requested` of them valid when achievable.
    pub fn golden_spiral(&self, requested: usize) -> Result<Vec<ModelPoint>, GeneratorError> {
        golden_spiral::generate(requested, &self.bounds, &self.horizon)
    }

    /// Points along a fixed target's path across a time window.
    pub fn sidereal_path(
        &self,
        request: &SiderealPathRequest,
    ) -> Result<SiderealPath, GeneratorError> {
        sidereal_path::generate(request, &self.bounds, &self.horizon)
    }
}
