//! Solve-and-register units.
//!
//! A unit owns one captured image and one limiter permit. It plate-solves the
//! image and registers the correspondence with the alignment engine, then reports
//! an outcome. Units never touch point state; the orchestrator applies outcomes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::{Mutex, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

use crate::devices::{
    AlignmentModel, AlignmentStar, CapturedImage, FittedModel, PlateSolver, SolveParams,
};
use crate::error::DeviceResult;
use crate::models::{EquatorialCoordinates, PierSide};

use super::session::BuildCounters;

/// Single-writer gate in front of the alignment engine.
///
/// Units finish concurrently but every spec mutation goes through one lock.
#[derive(Clone)]
pub struct SerializedAlignment {
    engine: Arc<dyn AlignmentModel>,
    writer: Arc<Mutex<()>>,
}

impl SerializedAlignment {
    pub fn new(engine: Arc<dyn AlignmentModel>) -> Self {
        Self {
            engine,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn delete_alignment(&self) -> DeviceResult<()> {
        let _w = self.writer.lock().await;
        self.engine.delete_alignment().await
    }

    pub async fn start_new_spec(&self) -> DeviceResult<bool> {
        let _w = self.writer.lock().await;
        self.engine.start_new_spec().await
    }

    pub async fn add_point(&self, star: &AlignmentStar) -> DeviceResult<i32> {
        let _w = self.writer.lock().await;
        self.engine.add_point(star).await
    }

    pub async fn finish_spec(&self) -> DeviceResult<bool> {
        let _w = self.writer.lock().await;
        self.engine.finish_spec().await
    }

    pub async fn fitted_model(&self) -> DeviceResult<FittedModel> {
        let _w = self.writer.lock().await;
        self.engine.fitted_model().await
    }
}

/// What a unit reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingOutcome {
    Added {
        point_id: usize,
        solved: EquatorialCoordinates,
        model_index: i32,
    },
    Failed {
        point_id: usize,
        /// Set when the solve succeeded but registration did not
        solved: Option<EquatorialCoordinates>,
        reason: String,
    },
    Cancelled {
        point_id: usize,
    },
}

impl ProcessingOutcome {
    pub fn point_id(&self) -> usize {
        match self {
            ProcessingOutcome::Added { point_id, .. }
            | ProcessingOutcome::Failed { point_id, .. }
            | ProcessingOutcome::Cancelled { point_id } => *point_id,
        }
    }
}

/// Everything recorded at capture time for one point.
#[derive(Debug, Clone)]
pub struct CaptureContext {
    pub point_id: usize,
    pub mount: EquatorialCoordinates,
    pub local_sidereal_time_hours: f64,
    pub side_of_pier: PierSide,
    pub captured_at: DateTime<Utc>,
}

/// One solve-and-register job.
pub struct ProcessingUnit {
    pub capture: CaptureContext,
    pub image: CapturedImage,
    pub search_radius_deg: f64,
    pub solver: Arc<dyn PlateSolver>,
    pub alignment: SerializedAlignment,
    pub counters: Arc<BuildCounters>,
    pub token: CancellationToken,
    pub permit: OwnedSemaphorePermit,
}

impl ProcessingUnit {
    pub async fn run(self) -> ProcessingOutcome {
        let point_id = self.capture.point_id;
        let token = self.token.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => ProcessingOutcome::Cancelled { point_id },
            outcome = self.process() => outcome,
        }
    }

    async fn process(self) -> ProcessingOutcome {
        // held until the outcome is produced
        let _permit = self.permit;
        let point_id = self.capture.point_id;
        let params = SolveParams {
            hint: self.capture.mount,
            search_radius_deg: self.search_radius_deg,
        };

        let solved = match self.solver.solve(&self.image, &params).await {
            Ok(outcome) => match outcome.position() {
                Some(solved) => solved,
                None => {
                    self.counters.record_failure();
                    return ProcessingOutcome::Failed {
                        point_id,
                        solved: None,
                        reason: "plate solve found no solution".to_string(),
                    };
                }
            },
            Err(e) => {
                self.counters.record_failure();
                return ProcessingOutcome::Failed {
                    point_id,
                    solved: None,
                    reason: format!("plate solve failed: {}", e),
                };
            }
        };
        debug!("point {} solved at {}", point_id, solved);

        let star = AlignmentStar {
            point_id,
            mount: self.capture.mount,
            solved,
            local_sidereal_time_hours: self.capture.local_sidereal_time_hours,
            side_of_pier: self.capture.side_of_pier,
            captured_at: self.capture.captured_at,
        };
        match self.alignment.add_point(&star).await {
            Ok(index) if index > 0 => {
                self.counters.record_success();
                ProcessingOutcome::Added {
                    point_id,
                    solved,
                    model_index: index,
                }
            }
            Ok(index) => {
                self.counters.record_failure();
                warn!(
                    "alignment engine rejected point {} (index {})",
                    point_id, index
                );
                ProcessingOutcome::Failed {
                    point_id,
                    solved: Some(solved),
                    reason: format!("alignment engine rejected point (index {})", index),
                }
            }
            Err(e) => {
                self.counters.record_failure();
                ProcessingOutcome::Failed {
                    point_id,
                    solved: Some(solved),
                    reason: format!("add point failed: {}", e),
                }
            }
        }
    }
}
