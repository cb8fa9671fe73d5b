//! The iteration loop of one build.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::config::BuildOptions;
use crate::devices::{AlignmentStar, Devices, Dome, FittedModel};
use crate::error::{BuildError, BuildResult, ErrorContext};
use crate::models::{ModelPoint, ModelPointState, PierSide};
use crate::progress::{ProgressLevel, ProgressSink, ProgressUpdate};

use super::processing::SerializedAlignment;
use super::session::{BuildSession, IterationSummary};
use super::{guarded, BuildEnvironment, BuildOutcome, MIN_MODEL_POINTS};

/// Everything one build needs besides its mutable session.
pub(super) struct BuildRun<'a> {
    pub(super) devices: &'a Devices,
    pub(super) environment: &'a BuildEnvironment,
    pub(super) progress: &'a dyn ProgressSink,
    pub(super) options: &'a BuildOptions,
    /// `None` when no dome is connected or it cannot be positioned
    pub(super) dome: Option<Arc<dyn Dome>>,
    pub(super) alignment: SerializedAlignment,
    /// Build-scoped child of the caller's cancel token
    pub(super) cancel: CancellationToken,
    pub(super) stop: CancellationToken,
    /// Read from the mount after setup
    pub(super) mount_corrects_refraction: bool,
    pub(super) tag: String,
}

impl BuildRun<'_> {
    pub(super) async fn execute(mut self, session: &mut BuildSession) -> BuildResult<BuildOutcome> {
        self.prepare_devices(session).await?;

        if self.options.sync_first_point && !self.stop.is_cancelled() {
            self.sync_first_point(session).await?;
        }

        let total = self.options.num_retries + 1;
        let mut full_restart = true;
        let mut latest: Option<FittedModel> = None;
        let mut stopped_early = false;

        for iteration in 1..=total {
            session.reset_for_iteration(full_restart)?;
            let ascending = session.ordering.is_ascending();
            let model = match self.run_iteration(session, iteration, total).await {
                Ok(model) => model,
                // a short iteration falls back to the best earlier point set
                Err(BuildError::InsufficientPoints { added, .. }) if session.best().is_some() => {
                    warn!(
                        "[{}] iteration {} ended with {} point(s), keeping the best earlier model",
                        self.tag, iteration, added
                    );
                    stopped_early = self.stop.is_cancelled();
                    latest = None;
                    break;
                }
                Err(e) => return Err(e),
            };

            let failed = session.failed_count();
            let unvisited = session.count(ModelPointState::Generated);
            session.history.push(IterationSummary {
                iteration,
                ascending,
                rms_arcsec: model.rms_arcsec,
                added: session.count(ModelPointState::AddedToModel),
                failed,
                full_restart,
            });
            if session.record_best(model.rms_arcsec, &model) {
                debug!("[{}] iteration {} is the best so far", self.tag, iteration);
            }
            latest = Some(model);

            if failed == 0 && unvisited == 0 {
                info!(
                    "[{}] all points added after {} iteration(s)",
                    self.tag, iteration
                );
                break;
            }
            if self.stop.is_cancelled() {
                info!(
                    "[{}] stop requested, finalizing after iteration {}",
                    self.tag, iteration
                );
                stopped_early = true;
                break;
            }
            if iteration == total {
                info!(
                    "[{}] {} point(s) still failed, no retries left",
                    self.tag, failed
                );
                break;
            }

            full_restart = failed > self.options.max_failed_points;
            if full_restart {
                warn!(
                    "[{}] {} failed points exceed the limit of {}, restarting from scratch",
                    self.tag, failed, self.options.max_failed_points
                );
            } else {
                info!("[{}] retrying {} failed point(s)", self.tag, failed);
            }
            if self.options.alternate_directions_between_iterations {
                session.ordering = session.ordering.flipped();
            }
        }

        let mut model = self.restore_best(session, latest).await?;
        if self.options.remove_high_rms_points_after_build {
            model = self.strip_high_rms(session, model).await?;
        }

        Ok(BuildOutcome {
            build_id: session.id,
            model,
            points: std::mem::take(&mut session.points),
            iterations: session.history.clone(),
            stopped_early,
            sync_offset: session.sync_offset,
        })
    }

    /// Put the devices in their build configuration.
    async fn prepare_devices(&mut self, session: &mut BuildSession) -> BuildResult<()> {
        let telescope = self.devices.telescope.clone();

        match guarded(&self.cancel, telescope.is_parked()).await? {
            Ok(true) => {
                info!("[{}] unparking telescope", self.tag);
                guarded(&self.cancel, telescope.unpark()).await?.map_err(|e| {
                    BuildError::precondition_with_context(
                        format!("failed to unpark telescope: {}", e),
                        ErrorContext::new("setup"),
                    )
                })?;
            }
            Ok(false) => {}
            Err(e) => warn!("[{}] could not read park state: {}", self.tag, e),
        }

        if let Some(filter) = &self.options.model_filter {
            let camera = &self.devices.camera;
            if let Err(e) = guarded(&self.cancel, camera.set_filter(Some(filter.clone()))).await? {
                warn!("[{}] could not select filter {}: {}", self.tag, filter, e);
            }
        }

        if let Some(dome) = &self.dome {
            if let Err(e) = guarded(&self.cancel, dome.set_follow(false)).await? {
                warn!("[{}] could not disable dome follow: {}", self.tag, e);
            }
        }

        if self.options.disable_refraction_correction {
            let result = guarded(&self.cancel, telescope.set_refraction_correction(false)).await?;
            if let Err(e) = result {
                warn!(
                    "[{}] could not disable refraction correction: {}",
                    self.tag, e
                );
            }
        }
        let refraction = guarded(&self.cancel, telescope.refraction_correction()).await?;
        self.mount_corrects_refraction = match refraction {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!("[{}] could not read refraction correction: {}", self.tag, e);
                false
            }
        };

        if self.options.minimize_meridian_flips {
            match guarded(&self.cancel, telescope.side_of_pier()).await? {
                Ok(PierSide::Unknown) => {}
                Ok(side) => {
                    debug!("[{}] visiting {} side of pier first", self.tag, side);
                    session.ordering = session.ordering.with_preferred_side(side);
                }
                Err(e) => warn!("[{}] could not read side of pier: {}", self.tag, e),
            }
        }
        Ok(())
    }

    async fn run_iteration(
        &self,
        session: &mut BuildSession,
        iteration: u32,
        total: u32,
    ) -> BuildResult<FittedModel> {
        let sweep = if session.ordering.is_ascending() {
            "ascending"
        } else {
            "descending"
        };
        info!(
            "[{}] iteration {}/{} sweeping {}",
            self.tag, iteration, total, sweep
        );
        self.report(
            session,
            ProgressLevel::Info,
            format!("Starting iteration {} of {}", iteration, total),
            Some(0.0),
        );

        self.open_spec().await?;
        let carried = self.register_carried(session).await?;
        let pending = session.count(ModelPointState::Generated);
        session.counters.reset(carried, pending);
        debug!("[{}] {} carried, {} to visit", self.tag, carried, pending);

        while !self.stop.is_cancelled() {
            self.drain_finished(session)?;
            let Some(next) = session.ordering.select_next(&session.points) else {
                break;
            };
            if self.visit_point(session, next).await?.is_deferred() {
                break;
            }
        }
        self.progress.next_point_changed(session.id, None);

        self.await_units(session).await?;
        self.finalize(session, Some(self.options.max_point_rms)).await
    }

    /// Delete the current alignment and start an empty spec.
    async fn open_spec(&self) -> BuildResult<()> {
        guarded(&self.cancel, self.alignment.delete_alignment())
            .await?
            .map_err(|e| BuildError::spec_failure("delete_alignment", e.to_string()))?;
        match guarded(&self.cancel, self.alignment.start_new_spec()).await? {
            Ok(true) => Ok(()),
            Ok(false) => Err(BuildError::spec_failure(
                "start_new_spec",
                "alignment engine refused to start a new spec",
            )),
            Err(e) => Err(BuildError::spec_failure("start_new_spec", e.to_string())),
        }
    }

    /// Register every point already in the model with the fresh spec.
    async fn register_carried(&self, session: &mut BuildSession) -> BuildResult<usize> {
        let carried: Vec<usize> = session
            .valid_ids
            .iter()
            .copied()
            .filter(|&id| session.points[id].state == ModelPointState::AddedToModel)
            .collect();

        let mut registered = 0;
        for id in carried {
            let Some(star) = alignment_star(session.point(id)?) else {
                warn!("[{}] point {} has no capture to re-register", self.tag, id);
                self.set_state(session, id, ModelPointState::Failed)?;
                continue;
            };
            match guarded(&self.cancel, self.alignment.add_point(&star)).await? {
                Ok(index) if index > 0 => {
                    session.point_mut(id)?.model_index = index;
                    registered += 1;
                }
                Ok(index) => {
                    warn!(
                        "[{}] re-registering point {} rejected (index {})",
                        self.tag, id, index
                    );
                    self.set_state(session, id, ModelPointState::Failed)?;
                }
                Err(e) => {
                    warn!("[{}] re-registering point {} failed: {}", self.tag, id, e);
                    self.set_state(session, id, ModelPointState::Failed)?;
                }
            }
        }
        Ok(registered)
    }

    /// Close the spec, fetch the fit and flag points above `ceiling`.
    async fn finalize(
        &self,
        session: &mut BuildSession,
        ceiling: Option<f64>,
    ) -> BuildResult<FittedModel> {
        let added = session.count(ModelPointState::AddedToModel);
        if added < MIN_MODEL_POINTS {
            error!("[{}] only {} point(s) in the model", self.tag, added);
            return Err(BuildError::InsufficientPoints {
                added,
                required: MIN_MODEL_POINTS,
            });
        }

        match guarded(&self.cancel, self.alignment.finish_spec()).await? {
            Ok(true) => {}
            Ok(false) => {
                return Err(BuildError::spec_failure(
                    "finish_spec",
                    "alignment engine could not fit the model",
                ))
            }
            Err(e) => return Err(BuildError::spec_failure("finish_spec", e.to_string())),
        }
        let model = guarded(&self.cancel, self.alignment.fitted_model())
            .await?
            .map_err(|e| BuildError::spec_failure("fitted_model", e.to_string()))?;

        for id in session.valid_ids.clone() {
            let residual = {
                let point = session.point_mut(id)?;
                if point.state != ModelPointState::AddedToModel {
                    continue;
                }
                let residual = model.residual_for(point.model_index);
                point.capture.residual_arcsec = residual;
                residual
            };
            if let (Some(residual), Some(ceiling)) = (residual, ceiling) {
                if residual > ceiling {
                    warn!(
                        "[{}] point {} residual {:.2}\" exceeds {:.2}\"",
                        self.tag, id, residual, ceiling
                    );
                    self.set_state(session, id, ModelPointState::FailedRms)?;
                }
            }
        }

        info!(
            "[{}] model fitted from {} points, rms {:.2}\"",
            self.tag, added, model.rms_arcsec
        );
        self.report(
            session,
            ProgressLevel::Success,
            format!(
                "Model fitted from {} points, RMS {:.2}\"",
                added, model.rms_arcsec
            ),
            Some(100.0),
        );
        Ok(model)
    }

    /// Register the current `AddedToModel` points with a new spec and fit it.
    async fn refit(
        &self,
        session: &mut BuildSession,
        ceiling: Option<f64>,
    ) -> BuildResult<FittedModel> {
        self.open_spec().await?;
        self.register_carried(session).await?;
        self.finalize(session, ceiling).await
    }

    /// Go back to the best snapshot if it beats `latest`.
    ///
    /// Without a `latest` model the snapshot is always restored.
    async fn restore_best(
        &self,
        session: &mut BuildSession,
        latest: Option<FittedModel>,
    ) -> BuildResult<FittedModel> {
        let best = match (session.best(), latest) {
            (Some(best), Some(latest)) if best.rms_arcsec >= latest.rms_arcsec => {
                return Ok(latest)
            }
            (Some(best), _) => best.clone(),
            (None, Some(latest)) => return Ok(latest),
            (None, None) => return Err(BuildError::internal("no iteration completed")),
        };
        info!(
            "[{}] restoring best model (rms {:.2}\")",
            self.tag, best.rms_arcsec
        );
        session.points = best.points;
        self.refit(session, Some(self.options.max_point_rms)).await
    }

    /// Drop points above the residual ceiling and refit without one.
    async fn strip_high_rms(
        &self,
        session: &mut BuildSession,
        latest: FittedModel,
    ) -> BuildResult<FittedModel> {
        let high = session.count(ModelPointState::FailedRms);
        if high == 0 {
            return Ok(latest);
        }
        let remaining = session.count(ModelPointState::AddedToModel);
        if remaining < MIN_MODEL_POINTS {
            warn!(
                "[{}] removing {} high-residual point(s) would leave {}, keeping the model",
                self.tag, high, remaining
            );
            return Ok(latest);
        }
        info!(
            "[{}] removing {} high-residual point(s) and refitting",
            self.tag, high
        );
        self.refit(session, None).await
    }

    /// Transition a point and notify the progress sink.
    pub(super) fn set_state(
        &self,
        session: &mut BuildSession,
        id: usize,
        state: ModelPointState,
    ) -> BuildResult<()> {
        session.transition(id, state)?;
        self.progress.point_state_changed(session.id, id, state);
        Ok(())
    }

    pub(super) fn report(
        &self,
        session: &BuildSession,
        level: ProgressLevel,
        message: String,
        percent: Option<f64>,
    ) {
        self.progress.report(ProgressUpdate {
            build_id: session.id,
            level,
            message,
            percent,
        });
    }
}

/// The correspondence recorded for a visited point.
fn alignment_star(point: &ModelPoint) -> Option<AlignmentStar> {
    let capture = &point.capture;
    Some(AlignmentStar {
        point_id: point.id,
        mount: capture.mount_coordinates?,
        solved: capture.solved_coordinates?,
        local_sidereal_time_hours: capture.local_sidereal_time_hours?,
        side_of_pier: capture.side_of_pier.unwrap_or_default(),
        captured_at: capture.captured_at.unwrap_or_else(chrono::Utc::now),
    })
}
