#![allow(dead_code)]

use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use pointing_model_builder::builder::{BuildEnvironment, BuildOrchestrator, BuildOutcome};
use pointing_model_builder::config::{BuildOptions, CONFIG_ENV_VAR};
use pointing_model_builder::devices::sim::{SimAlignmentModel, SimulatedObservatory};
use pointing_model_builder::error::BuildResult;
use pointing_model_builder::models::{ModelPoint, ModelPointState};
use pointing_model_builder::progress::{BuildStatus, ProgressSink, ProgressTracker, ProgressUpdate};

pub const LST: f64 = 6.0;

static CONFIG_ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with the config location variable pointing at `path`, or unset.
///
/// Tests touching the variable run one at a time and the previous value comes
/// back even if `f` panics.
pub fn with_config_path<R>(path: Option<&Path>, f: impl FnOnce() -> R) -> R {
    let _lock = CONFIG_ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _restore = ConfigPathOverride::apply(path);
    f()
}

struct ConfigPathOverride {
    previous: Option<OsString>,
}

impl ConfigPathOverride {
    fn apply(path: Option<&Path>) -> Self {
        let previous = std::env::var_os(CONFIG_ENV_VAR);
        match path {
            Some(path) => std::env::set_var(CONFIG_ENV_VAR, path),
            None => std::env::remove_var(CONFIG_ENV_VAR),
        }
        Self { previous }
    }
}

impl Drop for ConfigPathOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => std::env::set_var(CONFIG_ENV_VAR, value),
            None => std::env::remove_var(CONFIG_ENV_VAR),
        }
    }
}

/// Nine points spread over three altitudes and the full azimuth circle.
pub fn nine_points() -> Vec<ModelPoint> {
    (0..9)
        .map(|i| {
            ModelPoint::new(
                i,
                30.0 + (i % 3) as f64 * 15.0,
                i as f64 * 40.0 + 10.0,
                ModelPointState::Generated,
            )
        })
        .collect()
}

pub fn options() -> BuildOptions {
    BuildOptions {
        progress_interval_ms: 20,
        ..Default::default()
    }
}

/// Residual of `residual` for every point in every spec.
pub fn constant_alignment(residual: f64) -> SimAlignmentModel {
    SimAlignmentModel::new(Arc::new(move |_: usize, _: u32| residual))
}

/// Point `id` sits at `residual` in the first spec and at 1″ afterwards.
pub fn one_bad_point(id: usize, residual: f64) -> SimAlignmentModel {
    SimAlignmentModel::new(Arc::new(move |point: usize, spec: u32| {
        if spec == 1 && point == id {
            residual
        } else {
            1.0
        }
    }))
}

pub fn orchestrator(
    obs: &SimulatedObservatory,
    progress: Arc<dyn ProgressSink>,
) -> BuildOrchestrator {
    BuildOrchestrator::new(obs.devices(), BuildEnvironment::default()).with_progress(progress)
}

/// Runs a build that is never cancelled or stopped.
pub async fn run_build(
    obs: &SimulatedObservatory,
    progress: Arc<dyn ProgressSink>,
    points: &[ModelPoint],
    options: &BuildOptions,
) -> BuildResult<BuildOutcome> {
    orchestrator(obs, progress)
        .build(
            points,
            options,
            CancellationToken::new(),
            CancellationToken::new(),
        )
        .await
}

/// Progress sink that cancels a token once points have entered `state` `count` times.
pub struct TriggerSink {
    pub tracker: ProgressTracker,
    state: ModelPointState,
    count: usize,
    seen: AtomicUsize,
    token: CancellationToken,
    /// Cancel this long after the trigger instead of immediately
    delay: Option<Duration>,
}

impl TriggerSink {
    pub fn new(state: ModelPointState, count: usize, token: CancellationToken) -> Self {
        Self {
            tracker: ProgressTracker::new(),
            state,
            count,
            seen: AtomicUsize::new(0),
            token,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn fire(&self) {
        match self.delay {
            None => self.token.cancel(),
            Some(delay) => {
                let token = self.token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    token.cancel();
                });
            }
        }
    }
}

impl ProgressSink for TriggerSink {
    fn report(&self, update: ProgressUpdate) {
        self.tracker.report(update);
    }

    fn next_point_changed(&self, build_id: Uuid, point: Option<&ModelPoint>) {
        self.tracker.next_point_changed(build_id, point);
    }

    fn point_state_changed(&self, build_id: Uuid, point_id: usize, state: ModelPointState) {
        self.tracker.point_state_changed(build_id, point_id, state);
        if state == self.state && self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.count {
            self.fire();
        }
    }

    fn build_started(&self, build_id: Uuid) {
        self.tracker.build_started(build_id);
    }

    fn build_finished(&self, build_id: Uuid, status: BuildStatus) {
        self.tracker.build_finished(build_id, status);
    }
}
