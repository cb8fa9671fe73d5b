//! Alignment point record and its lifecycle.
//!
//! A [`ModelPoint`] is a plain mutable record. The orchestrator is its only
//! writer; observers hear about changes through the progress sink.
//!
//! Lifecycle:
//!
//! ```text
//! Generated -> UpNext -> Exposing -> Processing -> AddedToModel | Failed
//! AddedToModel -> FailedRMS            (finalization only)
//! Failed | FailedRMS -> Generated      (next retry iteration)
//! ```
//!
//! `OutsideAltitudeBounds`, `OutsideAzimuthBounds` and `BelowHorizon` are assigned
//! once at generation time and never left.

use chrono::{DateTime, Utc};
use qtty::Degrees;
use serde::{Deserialize, Serialize};

use super::coordinates::{EquatorialCoordinates, HorizontalCoordinates, PierSide};

/// Model index of a point that has not been registered with the alignment engine.
pub const UNASSIGNED_MODEL_INDEX: i32 = -1;

/// Point lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelPointState {
    Generated,
    UpNext,
    Exposing,
    Processing,
    AddedToModel,
    Failed,
    #[serde(rename = "FailedRMS")]
    FailedRms,
    OutsideAltitudeBounds,
    OutsideAzimuthBounds,
    BelowHorizon,
}

impl ModelPointState {
    /// Get the human-readable name for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelPointState::Generated => "generated",
            ModelPointState::UpNext => "up next",
            ModelPointState::Exposing => "exposing",
            ModelPointState::Processing => "processing",
            ModelPointState::AddedToModel => "added to model",
            ModelPointState::Failed => "failed",
            ModelPointState::FailedRms => "failed rms",
            ModelPointState::OutsideAltitudeBounds => "outside altitude bounds",
            ModelPointState::OutsideAzimuthBounds => "outside azimuth bounds",
            ModelPointState::BelowHorizon => "below horizon",
        }
    }

    /// Terminal exclusion states assigned at generation time.
    pub fn is_excluded(&self) -> bool {
        matches!(
            self,
            ModelPointState::OutsideAltitudeBounds
                | ModelPointState::OutsideAzimuthBounds
                | ModelPointState::BelowHorizon
        )
    }

    /// States counted as failures for the retry decision.
    pub fn is_failure(&self) -> bool {
        matches!(self, ModelPointState::Failed | ModelPointState::FailedRms)
    }

    /// Get all valid transitions FROM this state.
    pub fn valid_next_states(&self) -> &'static [ModelPointState] {
        use ModelPointState::*;
        match self {
            Generated => &[UpNext],
            UpNext => &[Exposing, Failed, Generated],
            Exposing => &[Processing, Failed, Generated],
            Processing => &[AddedToModel, Failed],
            AddedToModel => &[FailedRms, Failed, Generated],
            Failed => &[Generated],
            FailedRms => &[Generated],
            OutsideAltitudeBounds | OutsideAzimuthBounds | BelowHorizon => &[],
        }
    }

    /// Check if a transition to the given state is valid.
    pub fn can_transition_to(&self, next: ModelPointState) -> bool {
        self.valid_next_states().contains(&next)
    }
}

impl std::fmt::Display for ModelPointState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What was recorded while visiting a point.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Mount-reported position at capture time
    pub mount_coordinates: Option<EquatorialCoordinates>,
    /// Mount-reported local sidereal time at capture time, hours
    pub local_sidereal_time_hours: Option<f64>,
    /// Mount-reported side of pier at capture time
    pub side_of_pier: Option<PierSide>,
    /// Plate-solved position
    pub solved_coordinates: Option<EquatorialCoordinates>,
    /// Residual reported by the fitted model, arcseconds
    pub residual_arcsec: Option<f64>,
    pub captured_at: Option<DateTime<Utc>>,
}

/// One candidate calibration target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPoint {
    /// Position in the generated list
    pub id: usize,
    pub altitude: Degrees,
    pub azimuth: Degrees,
    pub state: ModelPointState,
    /// Lower dome azimuth bound keeping this point unobstructed (NaN if unconstrained)
    pub min_dome_azimuth: f64,
    /// Upper dome azimuth bound keeping this point unobstructed (NaN if unconstrained)
    pub max_dome_azimuth: f64,
    pub dome_target_altitude: f64,
    pub dome_target_azimuth: f64,
    pub expected_side_of_pier: PierSide,
    pub capture: CaptureRecord,
    /// Slot in the fitted model, [`UNASSIGNED_MODEL_INDEX`] until added
    pub model_index: i32,
}

impl ModelPoint {
    /// Create a point in the given state with no dome or capture data.
    pub fn new(id: usize, altitude_deg: f64, azimuth_deg: f64, state: ModelPointState) -> Self {
        Self {
            id,
            altitude: Degrees::new(altitude_deg),
            azimuth: Degrees::new(azimuth_deg),
            state,
            min_dome_azimuth: f64::NAN,
            max_dome_azimuth: f64::NAN,
            dome_target_altitude: f64::NAN,
            dome_target_azimuth: f64::NAN,
            expected_side_of_pier: PierSide::Unknown,
            capture: CaptureRecord::default(),
            model_index: UNASSIGNED_MODEL_INDEX,
        }
    }

    pub fn altitude_deg(&self) -> f64 {
        self.altitude.value()
    }

    pub fn azimuth_deg(&self) -> f64 {
        self.azimuth.value()
    }

    pub fn horizontal(&self) -> HorizontalCoordinates {
        HorizontalCoordinates {
            altitude: self.altitude,
            azimuth: self.azimuth,
        }
    }

    /// Whether the point has finite dome aperture bounds.
    pub fn has_dome_bounds(&self) -> bool {
        self.min_dome_azimuth.is_finite() && self.max_dome_azimuth.is_finite()
    }

    /// Whether altitude and azimuth lie in the legal numeric range.
    pub fn has_legal_position(&self) -> bool {
        let alt = self.altitude_deg();
        let az = self.azimuth_deg();
        (0.0..=90.0).contains(&alt) && (0.0..360.0).contains(&az)
    }

    /// Attempt to transition to the next state.
    pub fn transition_to(&mut self, next: ModelPointState) -> Result<(), String> {
        if !self.state.can_transition_to(next) {
            return Err(format!(
                "Invalid point transition for point {}: {} -> {}",
                self.id,
                self.state.as_str(),
                next.as_str()
            ));
        }
        self.state = next;
        Ok(())
    }

    /// Drop everything recorded during a previous visit.
    pub fn clear_capture(&mut self) {
        self.capture = CaptureRecord::default();
        self.model_index = UNASSIGNED_MODEL_INDEX;
    }
}
