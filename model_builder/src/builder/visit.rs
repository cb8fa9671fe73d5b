//! Visiting one point: dome, slew, admission, capture and dispatch.

use chrono::Utc;
use log::{debug, info, warn};
use tokio::task::JoinError;

use crate::astro::{apparent_to_true_altitude, horizontal_to_hour_angle};
use crate::devices::{ExposureRequest, SolveParams};
use crate::dome::point_visible_from;
use crate::error::{BuildError, BuildResult};
use crate::models::{CoordinateOffset, EquatorialCoordinates, ModelPoint, ModelPointState, PierSide};
use crate::ordering::PointOrdering;

use super::guarded;
use super::processing::{CaptureContext, ProcessingOutcome, ProcessingUnit};
use super::run::BuildRun;
use super::session::BuildSession;

/// How a visit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Visit {
    /// Captured and handed to a processing unit
    Dispatched,
    /// Slew or capture failed, the point is `Failed`
    Failed,
    /// Not admitted because of a stop, the point is back to `Generated`
    Deferred,
}

impl Visit {
    pub(super) fn is_deferred(self) -> bool {
        self == Visit::Deferred
    }
}

/// Dome azimuth to request so that `point` is inside the slit.
///
/// With dome-aware ordering the dome goes to the aperture edge facing the sweep
/// so that following points tend to be visible without another move.
pub(super) fn dome_azimuth_for(ordering: &PointOrdering, point: &ModelPoint) -> f64 {
    let azimuth = if ordering.dome_aware && point.has_dome_bounds() {
        let margin = ((point.max_dome_azimuth - point.min_dome_azimuth) / 4.0).min(1.0);
        if ordering.is_ascending() {
            point.max_dome_azimuth - margin
        } else {
            point.min_dome_azimuth + margin
        }
    } else if point.dome_target_azimuth.is_finite() {
        point.dome_target_azimuth
    } else {
        point.azimuth_deg()
    };
    azimuth.rem_euclid(360.0)
}

impl BuildRun<'_> {
    pub(super) async fn visit_point(
        &self,
        session: &mut BuildSession,
        id: usize,
    ) -> BuildResult<Visit> {
        self.set_state(session, id, ModelPointState::UpNext)?;
        self.progress.next_point_changed(session.id, Some(session.point(id)?));
        {
            let point = session.point(id)?;
            debug!(
                "[{}] next point {} alt={:.2} az={:.2}",
                self.tag,
                id,
                point.altitude_deg(),
                point.azimuth_deg()
            );
        }

        self.position_dome(session, id).await?;

        if self.stop.is_cancelled() {
            return self.defer(session, id);
        }
        if !self.slew_to_point(session, id, true).await? {
            self.fail_point(session, id)?;
            return Ok(Visit::Failed);
        }

        let limiter = session.limiter();
        let admitted = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(BuildError::Cancelled),
            _ = self.stop.cancelled() => None,
            permit = limiter.acquire_owned() => Some(
                permit.map_err(|_| BuildError::internal("processing limiter closed"))?,
            ),
        };
        let Some(permit) = admitted else {
            return self.defer(session, id);
        };
        if self.stop.is_cancelled() {
            drop(permit);
            return self.defer(session, id);
        }

        if self.dome.is_some() {
            self.settle_dome(session).await?;
            self.check_side_of_pier(session, id).await?;
        }

        self.set_state(session, id, ModelPointState::Exposing)?;
        let Some(mut context) = self.read_mount(id).await? else {
            self.fail_point(session, id)?;
            return Ok(Visit::Failed);
        };
        let request = self.exposure_request();
        let image = match guarded(&self.cancel, self.devices.camera.capture(&request)).await? {
            Ok(image) => image,
            Err(e) => {
                warn!("[{}] capture for point {} failed: {}", self.tag, id, e);
                self.fail_point(session, id)?;
                return Ok(Visit::Failed);
            }
        };
        context.captured_at = image.captured_at;
        {
            let capture = &mut session.point_mut(id)?.capture;
            capture.mount_coordinates = Some(context.mount);
            capture.local_sidereal_time_hours = Some(context.local_sidereal_time_hours);
            capture.side_of_pier = Some(context.side_of_pier);
            capture.captured_at = Some(context.captured_at);
        }

        self.set_state(session, id, ModelPointState::Processing)?;
        let unit = ProcessingUnit {
            capture: context,
            image,
            search_radius_deg: self.environment.capture.solve_search_radius_deg,
            solver: self.devices.solver.clone(),
            alignment: self.alignment.clone(),
            counters: session.counters.clone(),
            token: self.cancel.clone(),
            permit,
        };
        session.units.spawn(unit.run());
        Ok(Visit::Dispatched)
    }

    /// Visit the first point once and measure the mount's systematic offset.
    ///
    /// The point goes back to `Generated` and is visited again normally.
    pub(super) async fn sync_first_point(&self, session: &mut BuildSession) -> BuildResult<()> {
        let Some(id) = session.ordering.select_next(&session.points) else {
            return Ok(());
        };
        info!("[{}] syncing on point {}", self.tag, id);
        self.set_state(session, id, ModelPointState::UpNext)?;
        self.progress.next_point_changed(session.id, Some(session.point(id)?));
        self.position_dome(session, id).await?;

        if !self.slew_to_point(session, id, false).await? {
            warn!("[{}] sync slew failed, building without offset", self.tag);
            return self.set_state(session, id, ModelPointState::Generated);
        }
        if self.dome.is_some() {
            self.settle_dome(session).await?;
        }

        self.set_state(session, id, ModelPointState::Exposing)?;
        let offset = self.measure_offset(id).await?;
        self.set_state(session, id, ModelPointState::Generated)?;
        match offset {
            Some(offset) => {
                info!(
                    "[{}] sync offset RA {:+.2}s Dec {:+.2}\"",
                    self.tag,
                    offset.ra_hours * 3600.0,
                    offset.dec_deg * 3600.0
                );
                session.sync_offset = Some(offset);
            }
            None => warn!(
                "[{}] first point sync failed, building without offset",
                self.tag
            ),
        }
        Ok(())
    }

    async fn measure_offset(&self, id: usize) -> BuildResult<Option<CoordinateOffset>> {
        let Some(context) = self.read_mount(id).await? else {
            return Ok(None);
        };
        let request = self.exposure_request();
        let image = match guarded(&self.cancel, self.devices.camera.capture(&request)).await? {
            Ok(image) => image,
            Err(e) => {
                warn!("[{}] sync capture failed: {}", self.tag, e);
                return Ok(None);
            }
        };
        let params = SolveParams {
            hint: context.mount,
            search_radius_deg: self.environment.capture.solve_search_radius_deg,
        };
        match guarded(&self.cancel, self.devices.solver.solve(&image, &params)).await? {
            Ok(outcome) => Ok(outcome
                .position()
                .map(|solved| CoordinateOffset::between(&context.mount, &solved))),
            Err(e) => {
                warn!("[{}] sync solve failed: {}", self.tag, e);
                Ok(None)
            }
        }
    }

    fn exposure_request(&self) -> ExposureRequest {
        let capture = &self.environment.capture;
        ExposureRequest {
            exposure_secs: capture.exposure_secs,
            binning: capture.binning,
            gain: capture.gain,
            subframe_fraction: self.options.plate_solve_subframe_fraction,
        }
    }

    /// Mount position, sidereal time and side of pier right before a capture.
    async fn read_mount(&self, id: usize) -> BuildResult<Option<CaptureContext>> {
        let telescope = &self.devices.telescope;
        let mount = guarded(&self.cancel, telescope.coordinates()).await?;
        let lst = guarded(&self.cancel, telescope.sidereal_time()).await?;
        let side = guarded(&self.cancel, telescope.side_of_pier()).await?;
        match (mount, lst, side) {
            (Ok(mount), Ok(lst), Ok(side)) => Ok(Some(CaptureContext {
                point_id: id,
                mount,
                local_sidereal_time_hours: lst,
                side_of_pier: side,
                captured_at: Utc::now(),
            })),
            (mount, lst, side) => {
                let reason = [mount.err(), lst.err(), side.err()]
                    .into_iter()
                    .flatten()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                warn!(
                    "[{}] could not read mount state for point {}: {}",
                    self.tag, id, reason
                );
                Ok(None)
            }
        }
    }

    /// Celestial slew target for a point, from the mount's own sidereal time.
    async fn slew_target(
        &self,
        session: &BuildSession,
        id: usize,
        apply_offset: bool,
    ) -> BuildResult<Option<EquatorialCoordinates>> {
        let lst = match guarded(&self.cancel, self.devices.telescope.sidereal_time()).await? {
            Ok(lst) => lst,
            Err(e) => {
                warn!("[{}] could not read sidereal time: {}", self.tag, e);
                return Ok(None);
            }
        };
        let point = session.point(id)?;
        let altitude = if self.mount_corrects_refraction {
            apparent_to_true_altitude(point.altitude_deg(), &self.environment.atmosphere)
        } else {
            point.altitude_deg()
        };
        let (ha, dec) = horizontal_to_hour_angle(
            altitude,
            point.azimuth_deg(),
            self.environment.site.latitude_deg,
        );
        let target = EquatorialCoordinates::new(lst - ha, dec);
        Ok(Some(match (apply_offset, &session.sync_offset) {
            (true, Some(offset)) => target.offset_by(offset),
            _ => target,
        }))
    }

    /// Slew to a point. `Ok(false)` when the slew did not happen.
    async fn slew_to_point(
        &self,
        session: &BuildSession,
        id: usize,
        apply_offset: bool,
    ) -> BuildResult<bool> {
        let Some(target) = self.slew_target(session, id, apply_offset).await? else {
            return Ok(false);
        };
        let telescope = &self.devices.telescope;
        match guarded(&self.cancel, telescope.slew_to_coordinates(target)).await? {
            Ok(true) => {
                debug!("[{}] slewed to point {} at {}", self.tag, id, target);
                Ok(true)
            }
            Ok(false) => {
                warn!(
                    "[{}] mount refused slew to point {} at {}",
                    self.tag, id, target
                );
                Ok(false)
            }
            Err(e) => {
                warn!("[{}] slew to point {} failed: {}", self.tag, id, e);
                Ok(false)
            }
        }
    }

    /// Start a dome slew for a point unless the dome already frames it.
    async fn position_dome(&self, session: &mut BuildSession, id: usize) -> BuildResult<()> {
        let Some(dome) = self.dome.clone() else {
            return Ok(());
        };
        self.settle_dome(session).await?;

        let current = match guarded(&self.cancel, dome.azimuth()).await? {
            Ok(azimuth) => azimuth,
            Err(e) => {
                warn!("[{}] could not read dome azimuth: {}", self.tag, e);
                f64::NAN
            }
        };
        let point = session.point(id)?;
        if point_visible_from(point, current, self.options.dome_azimuth_tolerance_deg) {
            debug!(
                "[{}] point {} visible with dome at {:.1}",
                self.tag, id, current
            );
            return Ok(());
        }

        let target = dome_azimuth_for(&session.ordering, point);
        debug!(
            "[{}] dome {:.1} -> {:.1} for point {}",
            self.tag, current, target, id
        );
        let handle = tokio::spawn(async move { dome.slew_to_azimuth(target).await });
        session.track_dome_slew(handle)
    }

    /// Wait for the in-flight dome slew, if any. Dome failures are warnings.
    async fn settle_dome(&self, session: &mut BuildSession) -> BuildResult<()> {
        let Some(handle) = session.take_dome_slew() else {
            return Ok(());
        };
        let abort = handle.abort_handle();
        let joined = match guarded(&self.cancel, handle).await {
            Ok(joined) => joined,
            Err(e) => {
                abort.abort();
                return Err(e);
            }
        };
        match joined {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => warn!("[{}] dome refused to slew", self.tag),
            Ok(Err(e)) => warn!("[{}] dome slew failed: {}", self.tag, e),
            Err(e) => warn!("[{}] dome slew task ended early: {}", self.tag, e),
        }
        Ok(())
    }

    async fn check_side_of_pier(&self, session: &BuildSession, id: usize) -> BuildResult<()> {
        let expected = session.point(id)?.expected_side_of_pier;
        match guarded(&self.cancel, self.devices.telescope.side_of_pier()).await? {
            Ok(actual)
                if expected != PierSide::Unknown
                    && actual != PierSide::Unknown
                    && actual != expected =>
            {
                warn!(
                    "[{}] point {} is on the {} side of pier, dome expected {}",
                    self.tag, id, actual, expected
                );
            }
            Ok(_) => {}
            Err(e) => warn!("[{}] could not read side of pier: {}", self.tag, e),
        }
        Ok(())
    }

    fn defer(&self, session: &mut BuildSession, id: usize) -> BuildResult<Visit> {
        debug!("[{}] stop requested, point {} not admitted", self.tag, id);
        self.set_state(session, id, ModelPointState::Generated)?;
        Ok(Visit::Deferred)
    }

    fn fail_point(&self, session: &mut BuildSession, id: usize) -> BuildResult<()> {
        self.set_state(session, id, ModelPointState::Failed)?;
        session.counters.record_failure();
        Ok(())
    }

    /// Apply every outcome that is already available.
    pub(super) fn drain_finished(&self, session: &mut BuildSession) -> BuildResult<()> {
        while let Some(joined) = session.units.try_join_next() {
            self.apply_outcome(session, joined)?;
        }
        Ok(())
    }

    /// Wait for every in-flight unit and apply its outcome.
    pub(super) async fn await_units(&self, session: &mut BuildSession) -> BuildResult<()> {
        if !session.units.is_empty() {
            debug!(
                "[{}] waiting for {} processing unit(s)",
                self.tag,
                session.units.len()
            );
        }
        loop {
            let next = guarded(&self.cancel, session.units.join_next()).await?;
            let Some(joined) = next else {
                return Ok(());
            };
            self.apply_outcome(session, joined)?;
        }
    }

    fn apply_outcome(
        &self,
        session: &mut BuildSession,
        joined: Result<ProcessingOutcome, JoinError>,
    ) -> BuildResult<()> {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => return Err(BuildError::Cancelled),
            Err(e) => return Err(BuildError::internal(format!("processing unit panicked: {}", e))),
        };
        match outcome {
            ProcessingOutcome::Added {
                point_id,
                solved,
                model_index,
            } => {
                let point = session.point_mut(point_id)?;
                point.capture.solved_coordinates = Some(solved);
                point.model_index = model_index;
                self.set_state(session, point_id, ModelPointState::AddedToModel)?;
                debug!(
                    "[{}] point {} added as #{}",
                    self.tag, point_id, model_index
                );
            }
            ProcessingOutcome::Failed {
                point_id,
                solved,
                reason,
            } => {
                session.point_mut(point_id)?.capture.solved_coordinates = solved;
                warn!("[{}] point {} failed: {}", self.tag, point_id, reason);
                self.set_state(session, point_id, ModelPointState::Failed)?;
            }
            ProcessingOutcome::Cancelled { .. } => return Err(BuildError::Cancelled),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounded(min: f64, max: f64) -> ModelPoint {
        let mut p = ModelPoint::new(0, 40.0, (min + max) / 2.0, ModelPointState::Generated);
        p.min_dome_azimuth = min;
        p.max_dome_azimuth = max;
        p.dome_target_azimuth = (min + max) / 2.0;
        p
    }

    #[test]
    fn test_dome_goes_to_leading_edge() {
        let p = bounded(100.0, 120.0);
        let ascending = PointOrdering::new(false, true);
        let descending = PointOrdering::new(true, true);
        assert_eq!(dome_azimuth_for(&ascending, &p), 119.0);
        assert_eq!(dome_azimuth_for(&descending, &p), 101.0);
        assert!(point_visible_from(&p, dome_azimuth_for(&ascending, &p), 0.0));
    }

    #[test]
    fn test_dome_edge_wraps() {
        let p = bounded(350.0, 370.0);
        let az = dome_azimuth_for(&PointOrdering::new(false, true), &p);
        assert!((az - 9.0).abs() < 1e-9);
        assert!(point_visible_from(&p, az, 0.0));
    }

    #[test]
    fn test_dome_targets_centre_without_dome_ordering() {
        let p = bounded(100.0, 120.0);
        let plain = PointOrdering::new(false, false);
        assert_eq!(dome_azimuth_for(&plain, &p), 110.0);

        let bare = ModelPoint::new(0, 40.0, 200.0, ModelPointState::Generated);
        let dome_aware = PointOrdering::new(false, true);
        assert_eq!(dome_azimuth_for(&dome_aware, &bare), 200.0);
    }
}
