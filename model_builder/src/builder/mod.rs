//! Build orchestration.
//!
//! [`BuildOrchestrator::build`] drives one pointing-model build from a list of
//! alignment points to a fitted model:
//!
//! 1. preflight checks, before any hardware moves;
//! 2. device setup (unpark, filter, dome follow, refraction) with the prior state
//!    captured for restoration;
//! 3. up to `num_retries + 1` iterations of visiting points, each dispatching
//!    solve-and-register units that run concurrently under a permit limiter;
//! 4. best-model restoration and optional high-residual pruning;
//! 5. device restoration on every exit path.
//!
//! Hard cancel (`cancel`) aborts at the next suspension point and surfaces as
//! [`BuildError::Cancelled`]. Stop (`stop`) only prevents new points from being
//! admitted; the build then finalizes whatever made it into the model.

mod processing;
mod restore;
mod run;
mod session;
mod visit;


pub use processing::{CaptureContext, ProcessingOutcome, ProcessingUnit, SerializedAlignment};
pub use restore::DeviceSnapshot;
pub use session::{BestSnapshot, BuildCounters, BuildSession, IterationSummary};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::astro::{AtmosphericConditions, ObserverSite};
use crate::config::{BuildOptions, CaptureSettings, ModelBuilderConfig};
use crate::devices::{Devices, Dome, FittedModel};
use crate::dome::DomeGeometry;
use crate::error::{BuildError, BuildResult, ErrorContext};
use crate::models::{CoordinateOffset, ModelPoint, ModelPointState};
use crate::ordering::PointOrdering;
use crate::progress::{BuildStatus, LogProgress, ProgressLevel, ProgressSink, ProgressUpdate};

use run::BuildRun;

/// Fewest points a model can be fitted from.
pub const MIN_MODEL_POINTS: usize = 3;

/// Site and hardware description shared by every build.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BuildEnvironment {
    pub site: ObserverSite,
    pub atmosphere: AtmosphericConditions,
    pub dome: DomeGeometry,
    pub capture: CaptureSettings,
}

impl BuildEnvironment {
    pub fn from_config(config: &ModelBuilderConfig) -> Self {
        Self {
            site: config.site,
            atmosphere: config.atmosphere,
            dome: config.dome,
            capture: config.capture,
        }
    }
}

/// Result of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub build_id: Uuid,
    pub model: FittedModel,
    /// Final state of every input point, in input order
    pub points: Vec<ModelPoint>,
    pub iterations: Vec<IterationSummary>,
    /// Whether the stop signal ended the build before it converged
    pub stopped_early: bool,
    /// Offset measured on the first point, when syncing was requested and succeeded
    pub sync_offset: Option<CoordinateOffset>,
}

impl BuildOutcome {
    pub fn added_points(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.state == ModelPointState::AddedToModel)
            .count()
    }
}

/// Drives builds against one set of collaborators.
pub struct BuildOrchestrator {
    devices: Devices,
    environment: BuildEnvironment,
    progress: Arc<dyn ProgressSink>,
}

impl BuildOrchestrator {
    /// Orchestrator reporting progress to the log.
    pub fn new(devices: Devices, environment: BuildEnvironment) -> Self {
        Self {
            devices,
            environment,
            progress: Arc::new(LogProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn devices(&self) -> &Devices {
        &self.devices
    }

    pub fn environment(&self) -> &BuildEnvironment {
        &self.environment
    }

    /// Run one build over `points`.
    ///
    /// `points` are alignment points as produced by the generator: ids must match
    /// positions, excluded points are carried through untouched.
    pub async fn build(
        &self,
        points: &[ModelPoint],
        options: &BuildOptions,
        cancel: CancellationToken,
        stop: CancellationToken,
    ) -> BuildResult<BuildOutcome> {
        options.validate().map_err(|e| {
            BuildError::precondition_with_context(e.to_string(), ErrorContext::new("options"))
        })?;
        let dome = self.preflight(points).await?;

        let mut working = points.to_vec();
        for point in working.iter_mut().filter(|p| !p.state.is_excluded()) {
            self.environment.dome.annotate(
                point,
                self.environment.site.latitude_deg,
                options.dome_shutter_width_mm,
            );
        }

        let ordering = PointOrdering::new(
            options.west_to_east_sorting,
            options.minimize_dome_movement && dome.is_some(),
        );
        let mut session = BuildSession::new(
            working,
            options.concurrency_limit(),
            ordering,
            cancel.child_token(),
        );
        let tag = session.tag();
        info!(
            "[{}] starting build: {} points, {} eligible, dome {}",
            tag,
            session.points.len(),
            session.count(ModelPointState::Generated),
            if dome.is_some() { "in use" } else { "not used" }
        );
        self.progress.build_started(session.id);
        self.spawn_ticker(&mut session, options);

        let snapshot = DeviceSnapshot::capture(&self.devices, dome.as_ref(), &tag).await;
        let run = BuildRun {
            devices: &self.devices,
            environment: &self.environment,
            progress: self.progress.as_ref(),
            options,
            dome: dome.clone(),
            alignment: SerializedAlignment::new(self.devices.alignment.clone()),
            cancel: session.token.clone(),
            stop,
            mount_corrects_refraction: false,
            tag: tag.clone(),
        };
        let result = run.execute(&mut session).await;

        session.shutdown();
        snapshot.restore(&self.devices, dome.as_ref(), &tag).await;

        let status = match &result {
            Ok(outcome) => {
                info!(
                    "[{}] build finished: {} points in model, rms {:.2}\"",
                    tag,
                    outcome.model.point_count(),
                    outcome.model.rms_arcsec
                );
                BuildStatus::Completed
            }
            Err(e) if e.is_cancelled() => {
                warn!("[{}] build cancelled", tag);
                BuildStatus::Cancelled
            }
            Err(e) => {
                error!("[{}] build failed: {}", tag, e);
                BuildStatus::Failed
            }
        };
        self.progress.next_point_changed(session.id, None);
        self.progress.build_finished(session.id, status);
        result
    }

    /// Checks that must pass before anything moves. Returns the dome to use.
    async fn preflight(&self, points: &[ModelPoint]) -> BuildResult<Option<Arc<dyn Dome>>> {
        for (index, point) in points.iter().enumerate() {
            if point.id != index {
                return Err(BuildError::precondition_with_context(
                    format!(
                        "point id {} does not match its position {}",
                        point.id, index
                    ),
                    ErrorContext::new("preflight").with_point(point.id),
                ));
            }
            if !point.state.is_excluded() && !point.has_legal_position() {
                return Err(BuildError::precondition_with_context(
                    format!(
                        "point has an illegal position alt={} az={}",
                        point.altitude_deg(),
                        point.azimuth_deg()
                    ),
                    ErrorContext::new("preflight").with_point(point.id),
                ));
            }
        }

        if !self.devices.telescope.is_connected().await.unwrap_or(false) {
            return Err(BuildError::precondition("Telescope is not connected"));
        }
        if !self.devices.camera.is_connected().await.unwrap_or(false) {
            return Err(BuildError::precondition("Camera is not connected"));
        }

        let eligible = points
            .iter()
            .filter(|p| p.state == ModelPointState::Generated)
            .count();
        if eligible < MIN_MODEL_POINTS {
            return Err(BuildError::precondition(format!(
                "{} eligible points, at least {} required",
                eligible, MIN_MODEL_POINTS
            )));
        }

        let Some(dome) = self.devices.dome.clone() else {
            return Ok(None);
        };
        if !dome.is_connected().await.unwrap_or(false) {
            info!("Dome is not connected, building without dome sync");
            return Ok(None);
        }
        match dome.can_set_azimuth().await {
            Ok(true) => Ok(Some(dome)),
            Ok(false) => {
                warn!("Dome cannot set azimuth, building without dome sync");
                Ok(None)
            }
            Err(e) => {
                warn!(
                    "Could not query dome capabilities ({}), building without dome",
                    e
                );
                Ok(None)
            }
        }
    }

    /// Periodic percentage updates until the build token is cancelled.
    fn spawn_ticker(&self, session: &mut BuildSession, options: &BuildOptions) {
        let counters = session.counters.clone();
        let sink = self.progress.clone();
        let token = session.token.clone();
        let build_id = session.id;
        let period = Duration::from_millis(options.progress_interval_ms.max(1));
        session.set_ticker(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let (processed, failed) = counters.totals();
                        sink.report(ProgressUpdate {
                            build_id,
                            level: ProgressLevel::Info,
                            message: format!("{} points processed, {} failed", processed, failed),
                            percent: Some(counters.percent()),
                        });
                    }
                }
            }
        }));
    }
}

/// Await `fut` unless `cancel` fires first.
pub(crate) async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> BuildResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BuildError::Cancelled),
        out = fut => Ok(out),
    }
}
