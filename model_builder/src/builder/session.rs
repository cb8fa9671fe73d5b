//! Mutable per-build state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::devices::FittedModel;
use crate::error::{BuildError, BuildResult, DeviceResult, ErrorContext};
use crate::models::{CoordinateOffset, ModelPoint, ModelPointState};
use crate::ordering::PointOrdering;

use super::processing::ProcessingOutcome;

/// Running counters, shared with processing units and the progress ticker.
#[derive(Debug, Default)]
pub struct BuildCounters {
    /// Points that finished processing this iteration, either way
    pub processed: AtomicUsize,
    /// Points that failed this iteration
    pub failed: AtomicUsize,
    /// Points carried into this iteration from earlier ones
    pub prior_successful: AtomicUsize,
    /// Points to visit this iteration
    pub pending: AtomicUsize,
}

impl BuildCounters {
    pub fn reset(&self, prior_successful: usize, pending: usize) {
        self.processed.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
        self.prior_successful.store(prior_successful, Ordering::SeqCst);
        self.pending.store(pending, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_success(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Processed and failed counts, in that order.
    pub fn totals(&self) -> (usize, usize) {
        (
            self.processed.load(Ordering::SeqCst),
            self.failed.load(Ordering::SeqCst),
        )
    }

    /// Completion of the current iteration in percent.
    pub fn percent(&self) -> f64 {
        let pending = self.pending.load(Ordering::SeqCst);
        if pending == 0 {
            return 100.0;
        }
        (self.processed.load(Ordering::SeqCst) as f64 / pending as f64 * 100.0).min(100.0)
    }
}

/// Summary of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    /// 1-based
    pub iteration: u32,
    /// Sweep direction used
    pub ascending: bool,
    pub rms_arcsec: f64,
    pub added: usize,
    pub failed: usize,
    /// Whether this iteration started from scratch
    pub full_restart: bool,
}

/// Best point set observed so far.
#[derive(Debug, Clone)]
pub struct BestSnapshot {
    pub points: Vec<ModelPoint>,
    pub rms_arcsec: f64,
    pub model: FittedModel,
}

/// State owned by one build.
pub struct BuildSession {
    pub id: Uuid,
    pub points: Vec<ModelPoint>,
    /// Ids of points that are not excluded
    pub valid_ids: Vec<usize>,
    pub ordering: PointOrdering,
    pub counters: Arc<BuildCounters>,
    pub sync_offset: Option<CoordinateOffset>,
    pub history: Vec<IterationSummary>,
    /// Child of the caller's cancel token, cancelled when the build exits
    pub token: CancellationToken,
    pub(crate) units: JoinSet<ProcessingOutcome>,
    limiter: Arc<Semaphore>,
    best: Option<BestSnapshot>,
    dome_slew: Option<JoinHandle<DeviceResult<bool>>>,
    ticker: Option<JoinHandle<()>>,
}

impl BuildSession {
    pub fn new(
        points: Vec<ModelPoint>,
        permits: usize,
        ordering: PointOrdering,
        token: CancellationToken,
    ) -> Self {
        let valid_ids = points
            .iter()
            .filter(|p| !p.state.is_excluded())
            .map(|p| p.id)
            .collect();
        Self {
            id: Uuid::new_v4(),
            points,
            valid_ids,
            ordering,
            counters: Arc::new(BuildCounters::default()),
            sync_offset: None,
            history: Vec::new(),
            token,
            units: JoinSet::new(),
            limiter: Arc::new(Semaphore::new(permits.max(1))),
            best: None,
            dome_slew: None,
            ticker: None,
        }
    }

    /// Short id used to tag log lines.
    pub fn tag(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }

    pub fn limiter(&self) -> Arc<Semaphore> {
        self.limiter.clone()
    }

    pub fn point(&self, id: usize) -> BuildResult<&ModelPoint> {
        self.points.get(id).ok_or_else(|| unknown_point(id))
    }

    pub fn point_mut(&mut self, id: usize) -> BuildResult<&mut ModelPoint> {
        self.points.get_mut(id).ok_or_else(|| unknown_point(id))
    }

    /// Move a point to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, id: usize, next: ModelPointState) -> BuildResult<()> {
        let point = self.point_mut(id)?;
        point.transition_to(next).map_err(|message| {
            let context = ErrorContext::new("transition").with_point(id);
            BuildError::internal_with_context(message, context)
        })
    }

    pub fn count(&self, state: ModelPointState) -> usize {
        self.points.iter().filter(|p| p.state == state).count()
    }

    pub fn failed_count(&self) -> usize {
        self.points.iter().filter(|p| p.state.is_failure()).count()
    }

    /// Prepare points for the next iteration.
    ///
    /// Incremental: failed points go back to `Generated`, carried points keep
    /// their capture but lose their model index. Full restart: every valid point
    /// goes back to `Generated` with a clean capture.
    pub fn reset_for_iteration(&mut self, full_restart: bool) -> BuildResult<()> {
        for id in self.valid_ids.clone() {
            let state = self.point(id)?.state;
            match state {
                ModelPointState::AddedToModel if !full_restart => {
                    self.point_mut(id)?.model_index = crate::models::UNASSIGNED_MODEL_INDEX;
                }
                ModelPointState::Generated => {
                    self.point_mut(id)?.clear_capture();
                }
                _ => {
                    self.transition(id, ModelPointState::Generated)?;
                    self.point_mut(id)?.clear_capture();
                }
            }
        }
        Ok(())
    }

    pub fn best(&self) -> Option<&BestSnapshot> {
        self.best.as_ref()
    }

    /// Keep the current points as best if `rms` improves on the stored snapshot.
    pub fn record_best(&mut self, rms_arcsec: f64, model: &FittedModel) -> bool {
        let improved = self
            .best
            .as_ref()
            .map_or(true, |best| rms_arcsec < best.rms_arcsec);
        if improved {
            self.best = Some(BestSnapshot {
                points: self.points.clone(),
                rms_arcsec,
                model: model.clone(),
            });
        }
        improved
    }

    pub fn has_dome_slew(&self) -> bool {
        self.dome_slew.is_some()
    }

    /// Track a dome slew. Only one may be in flight.
    pub fn track_dome_slew(&mut self, handle: JoinHandle<DeviceResult<bool>>) -> BuildResult<()> {
        if self.dome_slew.is_some() {
            handle.abort();
            return Err(BuildError::internal_with_context(
                "a dome slew is already in flight",
                ErrorContext::new("dome_slew"),
            ));
        }
        self.dome_slew = Some(handle);
        Ok(())
    }

    pub fn take_dome_slew(&mut self) -> Option<JoinHandle<DeviceResult<bool>>> {
        self.dome_slew.take()
    }

    pub fn set_ticker(&mut self, handle: JoinHandle<()>) {
        if let Some(old) = self.ticker.replace(handle) {
            old.abort();
        }
    }

    /// Cancel every piece of outstanding async work.
    pub fn shutdown(&mut self) {
        self.token.cancel();
        self.units.abort_all();
        if let Some(handle) = self.dome_slew.take() {
            handle.abort();
        }
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }
}

impl Drop for BuildSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn unknown_point(id: usize) -> BuildError {
    BuildError::internal_with_context("unknown point", ErrorContext::new("lookup").with_point(id))
}
