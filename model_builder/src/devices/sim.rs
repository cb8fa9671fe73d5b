//! In-memory simulator for every collaborator.
//!
//! The simulated mount has a fixed systematic pointing error: it reports the
//! commanded position while actually pointing at `commanded - error`. The camera
//! embeds both positions in the image headers and the solver reads the true one
//! back, so a first-point sync recovers exactly the configured error.
//!
//! Failures are injected by call number (1-based) so scenarios stay deterministic
//! under concurrency.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::{
    AlignmentModel, AlignmentStar, Camera, CapturedImage, Devices, Dome, ExposureRequest,
    FittedModel, PlateSolver, PointResidual, SolveOutcome, SolveParams, Telescope,
};
use crate::astro::hour_angle;
use crate::config::SimulatorSettings;
use crate::dome::expected_side_of_pier;
use crate::error::{DeviceError, DeviceResult};
use crate::models::{CoordinateOffset, EquatorialCoordinates, PierSide};

const HEADER_REPORTED_RA: &str = "OBJCTRA";
const HEADER_REPORTED_DEC: &str = "OBJCTDEC";
const HEADER_TRUE_RA: &str = "SIM_RA";
const HEADER_TRUE_DEC: &str = "SIM_DEC";
const HEADER_FILTER: &str = "FILTER";

/// Tracks how many calls overlap.
#[derive(Debug, Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) -> ConcurrencyGuard<'_> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        ConcurrencyGuard(self)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct ConcurrencyGuard<'a>(&'a Concurrency);

impl Drop for ConcurrencyGuard<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

async fn pause(delay: Duration) {
    if delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(delay).await;
    }
}

// ==================== Telescope ====================

#[derive(Debug)]
struct MountState {
    connected: bool,
    parked: bool,
    reported: EquatorialCoordinates,
    side: PierSide,
    refraction: bool,
    slews: Vec<EquatorialCoordinates>,
    fail_slews: HashSet<usize>,
    park_calls: usize,
}

/// Simulated German equatorial mount.
#[derive(Debug)]
pub struct SimTelescope {
    state: Mutex<MountState>,
    pointing_error: CoordinateOffset,
    lst_hours: f64,
    slew_delay: Duration,
}

impl SimTelescope {
    pub fn new(lst_hours: f64) -> Self {
        Self {
            state: Mutex::new(MountState {
                connected: true,
                parked: false,
                reported: EquatorialCoordinates::new(lst_hours, 0.0),
                side: PierSide::East,
                refraction: true,
                slews: Vec::new(),
                fail_slews: HashSet::new(),
                park_calls: 0,
            }),
            pointing_error: CoordinateOffset::default(),
            lst_hours,
            slew_delay: Duration::ZERO,
        }
    }

    pub fn with_pointing_error(mut self, error: CoordinateOffset) -> Self {
        self.pointing_error = error;
        self
    }

    pub fn with_slew_delay(mut self, delay: Duration) -> Self {
        self.slew_delay = delay;
        self
    }

    pub fn with_position(self, position: EquatorialCoordinates) -> Self {
        self.state.lock().reported = position;
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    pub fn set_parked(&self, parked: bool) {
        self.state.lock().parked = parked;
    }

    pub fn set_refraction(&self, enabled: bool) {
        self.state.lock().refraction = enabled;
    }

    /// Make the n-th slew (1-based) fail.
    pub fn fail_slew(&self, call: usize) {
        self.state.lock().fail_slews.insert(call);
    }

    pub fn pointing_error(&self) -> CoordinateOffset {
        self.pointing_error
    }

    pub fn lst_hours(&self) -> f64 {
        self.lst_hours
    }

    /// Where the optics actually point.
    pub fn true_pointing(&self) -> EquatorialCoordinates {
        let reported = self.state.lock().reported;
        reported.offset_by(&CoordinateOffset {
            ra_hours: -self.pointing_error.ra_hours,
            dec_deg: -self.pointing_error.dec_deg,
        })
    }

    pub fn reported(&self) -> EquatorialCoordinates {
        self.state.lock().reported
    }

    pub fn slews(&self) -> Vec<EquatorialCoordinates> {
        self.state.lock().slews.clone()
    }

    pub fn is_parked_now(&self) -> bool {
        self.state.lock().parked
    }

    pub fn park_calls(&self) -> usize {
        self.state.lock().park_calls
    }

    pub fn refraction_enabled(&self) -> bool {
        self.state.lock().refraction
    }

    fn ensure_connected(&self) -> DeviceResult<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(DeviceError::not_connected("Telescope"))
        }
    }
}

#[async_trait]
impl Telescope for SimTelescope {
    async fn is_connected(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().connected)
    }

    async fn coordinates(&self) -> DeviceResult<EquatorialCoordinates> {
        self.ensure_connected()?;
        Ok(self.state.lock().reported)
    }

    async fn sidereal_time(&self) -> DeviceResult<f64> {
        self.ensure_connected()?;
        Ok(self.lst_hours)
    }

    async fn side_of_pier(&self) -> DeviceResult<PierSide> {
        self.ensure_connected()?;
        Ok(self.state.lock().side)
    }

    async fn is_parked(&self) -> DeviceResult<bool> {
        self.ensure_connected()?;
        Ok(self.state.lock().parked)
    }

    async fn park(&self) -> DeviceResult<()> {
        self.ensure_connected()?;
        let mut state = self.state.lock();
        state.parked = true;
        state.park_calls += 1;
        Ok(())
    }

    async fn unpark(&self) -> DeviceResult<()> {
        self.ensure_connected()?;
        self.state.lock().parked = false;
        Ok(())
    }

    async fn slew_to_coordinates(&self, target: EquatorialCoordinates) -> DeviceResult<bool> {
        self.ensure_connected()?;
        let call = {
            let mut state = self.state.lock();
            if state.parked {
                return Err(DeviceError::failed("Telescope", "slew", "mount is parked"));
            }
            state.slews.push(target);
            state.slews.len()
        };
        pause(self.slew_delay).await;

        let mut state = self.state.lock();
        if state.fail_slews.contains(&call) {
            return Err(DeviceError::failed(
                "Telescope",
                "slew",
                format!("injected failure on slew {}", call),
            ));
        }
        state.reported = target;
        state.side = expected_side_of_pier(hour_angle(self.lst_hours, target.ra_hours));
        Ok(true)
    }

    async fn refraction_correction(&self) -> DeviceResult<bool> {
        self.ensure_connected()?;
        Ok(self.state.lock().refraction)
    }

    async fn set_refraction_correction(&self, enabled: bool) -> DeviceResult<()> {
        self.ensure_connected()?;
        self.state.lock().refraction = enabled;
        Ok(())
    }
}

// ==================== Camera ====================

#[derive(Debug)]
struct CameraState {
    connected: bool,
    filter: Option<String>,
    captures: usize,
    fail_captures: HashSet<usize>,
    filters_used: Vec<Option<String>>,
}

/// Simulated camera bound to a simulated mount.
#[derive(Debug)]
pub struct SimCamera {
    telescope: Arc<SimTelescope>,
    state: Mutex<CameraState>,
    capture_delay: Duration,
    concurrency: Concurrency,
}

impl SimCamera {
    pub fn new(telescope: Arc<SimTelescope>) -> Self {
        Self {
            telescope,
            state: Mutex::new(CameraState {
                connected: true,
                filter: None,
                captures: 0,
                fail_captures: HashSet::new(),
                filters_used: Vec::new(),
            }),
            capture_delay: Duration::ZERO,
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_capture_delay(mut self, delay: Duration) -> Self {
        self.capture_delay = delay;
        self
    }

    pub fn with_filter(self, filter: impl Into<String>) -> Self {
        self.state.lock().filter = Some(filter.into());
        self
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Make the n-th capture (1-based) fail.
    pub fn fail_capture(&self, call: usize) {
        self.state.lock().fail_captures.insert(call);
    }

    pub fn filter(&self) -> Option<String> {
        self.state.lock().filter.clone()
    }

    pub fn captures(&self) -> usize {
        self.state.lock().captures
    }

    pub fn filters_used(&self) -> Vec<Option<String>> {
        self.state.lock().filters_used.clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.concurrency.peak()
    }
}

#[async_trait]
impl Camera for SimCamera {
    async fn is_connected(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().connected)
    }

    async fn capture(&self, request: &ExposureRequest) -> DeviceResult<CapturedImage> {
        let _guard = self.concurrency.enter();
        let (call, filter) = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(DeviceError::not_connected("Camera"));
            }
            state.captures += 1;
            let filter = state.filter.clone();
            state.filters_used.push(filter.clone());
            (state.captures, filter)
        };
        pause(self.capture_delay).await;

        if self.state.lock().fail_captures.contains(&call) {
            return Err(DeviceError::failed(
                "Camera",
                "capture",
                format!("injected failure on capture {}", call),
            ));
        }

        let reported = self.telescope.reported();
        let actual = self.telescope.true_pointing();
        let mut headers = BTreeMap::new();
        for (key, value) in [
            (HEADER_REPORTED_RA, reported.ra_hours),
            (HEADER_REPORTED_DEC, reported.dec_deg),
            (HEADER_TRUE_RA, actual.ra_hours),
            (HEADER_TRUE_DEC, actual.dec_deg),
        ] {
            headers.insert(key.to_string(), value.to_string());
        }
        if let Some(filter) = filter {
            headers.insert(HEADER_FILTER.to_string(), filter);
        }

        let full = (4096.0 * request.subframe_fraction.clamp(0.05, 1.0)) as u32;
        let side = full / request.binning.max(1);
        Ok(CapturedImage {
            width: side,
            height: side,
            binning: request.binning,
            exposure_secs: request.exposure_secs,
            captured_at: Utc::now(),
            headers,
        })
    }

    async fn current_filter(&self) -> DeviceResult<Option<String>> {
        Ok(self.state.lock().filter.clone())
    }

    async fn set_filter(&self, filter: Option<String>) -> DeviceResult<()> {
        self.state.lock().filter = filter;
        Ok(())
    }
}

// ==================== Dome ====================

#[derive(Debug)]
struct DomeState {
    connected: bool,
    can_set_azimuth: bool,
    azimuth: f64,
    slewing: bool,
    follow: bool,
    slews: Vec<f64>,
    fail_slews: HashSet<usize>,
}

/// Simulated rotating dome.
#[derive(Debug)]
pub struct SimDome {
    state: Mutex<DomeState>,
    latency: Duration,
    concurrency: Concurrency,
}

impl SimDome {
    pub fn new(azimuth_deg: f64) -> Self {
        Self {
            state: Mutex::new(DomeState {
                connected: true,
                can_set_azimuth: true,
                azimuth: azimuth_deg.rem_euclid(360.0),
                slewing: false,
                follow: true,
                slews: Vec::new(),
                fail_slews: HashSet::new(),
            }),
            latency: Duration::ZERO,
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_can_set_azimuth(&self, can: bool) {
        self.state.lock().can_set_azimuth = can;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Make the n-th dome slew (1-based) fail.
    pub fn fail_slew(&self, call: usize) {
        self.state.lock().fail_slews.insert(call);
    }

    pub fn slews(&self) -> Vec<f64> {
        self.state.lock().slews.clone()
    }

    pub fn current_azimuth(&self) -> f64 {
        self.state.lock().azimuth
    }

    pub fn follow(&self) -> bool {
        self.state.lock().follow
    }

    pub fn peak_concurrent_slews(&self) -> usize {
        self.concurrency.peak()
    }
}

#[async_trait]
impl Dome for SimDome {
    async fn is_connected(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().connected)
    }

    async fn can_set_azimuth(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().can_set_azimuth)
    }

    async fn slew_to_azimuth(&self, azimuth_deg: f64) -> DeviceResult<bool> {
        let _guard = self.concurrency.enter();
        let call = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(DeviceError::not_connected("Dome"));
            }
            state.slewing = true;
            state.slews.push(azimuth_deg);
            state.slews.len()
        };
        pause(self.latency).await;

        let mut state = self.state.lock();
        state.slewing = false;
        if state.fail_slews.contains(&call) {
            return Err(DeviceError::failed(
                "Dome",
                "slew",
                format!("injected failure on dome slew {}", call),
            ));
        }
        state.azimuth = azimuth_deg.rem_euclid(360.0);
        Ok(true)
    }

    async fn is_slewing(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().slewing)
    }

    async fn azimuth(&self) -> DeviceResult<f64> {
        Ok(self.state.lock().azimuth)
    }

    async fn follow_enabled(&self) -> DeviceResult<bool> {
        Ok(self.state.lock().follow)
    }

    async fn set_follow(&self, enabled: bool) -> DeviceResult<()> {
        self.state.lock().follow = enabled;
        Ok(())
    }
}

// ==================== Plate solver ====================

/// Solver that reads the simulated true pointing back out of the image.
#[derive(Debug, Default)]
pub struct SimPlateSolver {
    delay: Duration,
    calls: AtomicUsize,
    fail_solves: Mutex<HashSet<usize>>,
    concurrency: Concurrency,
}

impl SimPlateSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the n-th solve (1-based) report no solution.
    pub fn fail_solve(&self, call: usize) {
        self.fail_solves.lock().insert(call);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.concurrency.peak()
    }
}

#[async_trait]
impl PlateSolver for SimPlateSolver {
    async fn solve(
        &self,
        image: &CapturedImage,
        _params: &SolveParams,
    ) -> DeviceResult<SolveOutcome> {
        let _guard = self.concurrency.enter();
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        pause(self.delay).await;

        if self.fail_solves.lock().contains(&call) {
            return Ok(SolveOutcome::failed());
        }
        match (image.header_f64(HEADER_TRUE_RA), image.header_f64(HEADER_TRUE_DEC)) {
            (Some(ra), Some(dec)) => Ok(SolveOutcome::solved(EquatorialCoordinates::new(ra, dec))),
            _ => Ok(SolveOutcome::failed()),
        }
    }
}

// ==================== Alignment model ====================

/// Residual in arcseconds for `(point id, spec number)`. Spec numbers start at 1
/// and increase with every `start_new_spec`.
pub type ResidualRule = Arc<dyn Fn(usize, u32) -> f64 + Send + Sync>;

/// One recorded call on the simulated alignment engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AlignmentCall {
    Delete,
    Start,
    Add(usize),
    Finish,
    Fetch,
}

#[derive(Debug, Default)]
struct AlignmentState {
    spec_active: bool,
    finished: bool,
    spec_number: u32,
    next_index: i32,
    stars: Vec<(i32, AlignmentStar)>,
    calls: Vec<AlignmentCall>,
    reject_points: HashSet<usize>,
    fail_start: bool,
    fail_finish: bool,
}

/// Alignment engine with caller-supplied residuals.
pub struct SimAlignmentModel {
    rule: ResidualRule,
    state: Mutex<AlignmentState>,
    concurrency: Concurrency,
    delay: Duration,
}

impl std::fmt::Debug for SimAlignmentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimAlignmentModel")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for SimAlignmentModel {
    fn default() -> Self {
        Self::new(Arc::new(|id: usize, _: u32| 1.0 + (id % 5) as f64 * 0.4))
    }
}

impl SimAlignmentModel {
    pub fn new(rule: ResidualRule) -> Self {
        Self {
            rule,
            state: Mutex::new(AlignmentState::default()),
            concurrency: Concurrency::default(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn reject_point(&self, point_id: usize) {
        self.state.lock().reject_points.insert(point_id);
    }

    pub fn set_fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub fn set_fail_finish(&self, fail: bool) {
        self.state.lock().fail_finish = fail;
    }

    pub fn calls(&self) -> Vec<AlignmentCall> {
        self.state.lock().calls.clone()
    }

    pub fn spec_count(&self) -> u32 {
        self.state.lock().spec_number
    }

    /// Point ids registered in the current spec.
    pub fn registered_points(&self) -> Vec<usize> {
        let state = self.state.lock();
        state.stars.iter().map(|(_, s)| s.point_id).collect()
    }

    /// Highest number of overlapping calls seen.
    pub fn peak_concurrent_calls(&self) -> usize {
        self.concurrency.peak()
    }

    fn record(&self, call: AlignmentCall) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl AlignmentModel for SimAlignmentModel {
    async fn delete_alignment(&self) -> DeviceResult<()> {
        let _guard = self.concurrency.enter();
        pause(self.delay).await;
        self.record(AlignmentCall::Delete);
        let mut state = self.state.lock();
        state.stars.clear();
        state.spec_active = false;
        state.finished = false;
        Ok(())
    }

    async fn start_new_spec(&self) -> DeviceResult<bool> {
        let _guard = self.concurrency.enter();
        pause(self.delay).await;
        self.record(AlignmentCall::Start);
        let mut state = self.state.lock();
        if state.fail_start {
            return Ok(false);
        }
        state.spec_number += 1;
        state.spec_active = true;
        state.finished = false;
        state.next_index = 1;
        state.stars.clear();
        Ok(true)
    }

    async fn add_point(&self, star: &AlignmentStar) -> DeviceResult<i32> {
        let _guard = self.concurrency.enter();
        pause(self.delay).await;
        self.record(AlignmentCall::Add(star.point_id));
        let mut state = self.state.lock();
        if !state.spec_active {
            return Err(DeviceError::failed("Alignment", "add_point", "no active spec"));
        }
        if state.reject_points.contains(&star.point_id) {
            return Ok(-1);
        }
        let index = state.next_index;
        state.next_index += 1;
        state.stars.push((index, star.clone()));
        Ok(index)
    }

    async fn finish_spec(&self) -> DeviceResult<bool> {
        let _guard = self.concurrency.enter();
        pause(self.delay).await;
        self.record(AlignmentCall::Finish);
        let mut state = self.state.lock();
        if state.fail_finish || !state.spec_active {
            return Ok(false);
        }
        state.spec_active = false;
        state.finished = true;
        Ok(true)
    }

    async fn fitted_model(&self) -> DeviceResult<FittedModel> {
        let _guard = self.concurrency.enter();
        pause(self.delay).await;
        self.record(AlignmentCall::Fetch);
        let state = self.state.lock();
        if !state.finished {
            return Err(DeviceError::failed("Alignment", "fitted_model", "spec not finished"));
        }
        let residuals: Vec<PointResidual> = state
            .stars
            .iter()
            .map(|(index, star)| PointResidual {
                model_index: *index,
                residual_arcsec: (self.rule)(star.point_id, state.spec_number),
            })
            .collect();
        let rms_arcsec = if residuals.is_empty() {
            0.0
        } else {
            let sum: f64 = residuals.iter().map(|r| r.residual_arcsec.powi(2)).sum();
            (sum / residuals.len() as f64).sqrt()
        };
        Ok(FittedModel {
            rms_arcsec,
            residuals,
        })
    }
}

// ==================== Observatory ====================

/// A complete simulated installation with typed handles for inspection.
#[derive(Debug, Clone)]
pub struct SimulatedObservatory {
    pub telescope: Arc<SimTelescope>,
    pub camera: Arc<SimCamera>,
    pub dome: Option<Arc<SimDome>>,
    pub solver: Arc<SimPlateSolver>,
    pub alignment: Arc<SimAlignmentModel>,
}

impl SimulatedObservatory {
    /// Instant devices, no pointing error, no dome.
    pub fn new(lst_hours: f64) -> Self {
        let telescope = Arc::new(SimTelescope::new(lst_hours));
        Self {
            camera: Arc::new(SimCamera::new(telescope.clone())),
            telescope,
            dome: None,
            solver: Arc::new(SimPlateSolver::new()),
            alignment: Arc::new(SimAlignmentModel::default()),
        }
    }

    /// Build from configuration.
    pub fn from_settings(settings: &SimulatorSettings) -> Self {
        let error = CoordinateOffset {
            ra_hours: settings.pointing_error_ra_arcsec / 3600.0 / 15.0,
            dec_deg: settings.pointing_error_dec_arcsec / 3600.0,
        };
        let telescope = Arc::new(
            SimTelescope::new(settings.lst_hours)
                .with_pointing_error(error)
                .with_slew_delay(Duration::from_millis(settings.slew_delay_ms)),
        );
        let camera = SimCamera::new(telescope.clone())
            .with_capture_delay(Duration::from_millis(settings.capture_delay_ms));
        let dome = settings.with_dome.then(|| {
            Arc::new(
                SimDome::new(settings.dome_start_azimuth_deg)
                    .with_latency(Duration::from_millis(settings.dome_latency_ms)),
            )
        });
        let max_rms = settings.residual_scale_arcsec;
        Self {
            telescope,
            camera: Arc::new(camera),
            dome,
            solver: Arc::new(
                SimPlateSolver::new().with_delay(Duration::from_millis(settings.solve_delay_ms)),
            ),
            alignment: Arc::new(SimAlignmentModel::new(Arc::new(move |id: usize, _: u32| {
                max_rms * (0.3 + 0.7 * ((id * 7919) % 97) as f64 / 97.0)
            }))),
        }
    }

    pub fn with_dome(mut self, dome: SimDome) -> Self {
        self.dome = Some(Arc::new(dome));
        self
    }

    pub fn with_alignment(mut self, alignment: SimAlignmentModel) -> Self {
        self.alignment = Arc::new(alignment);
        self
    }

    pub fn with_solver(mut self, solver: SimPlateSolver) -> Self {
        self.solver = Arc::new(solver);
        self
    }

    /// Replace the mount; the camera is rebound to it.
    pub fn with_telescope(mut self, telescope: SimTelescope) -> Self {
        self.telescope = Arc::new(telescope);
        self.camera = Arc::new(SimCamera::new(self.telescope.clone()));
        self
    }

    pub fn with_camera(mut self, build: impl FnOnce(SimCamera) -> SimCamera) -> Self {
        self.camera = Arc::new(build(SimCamera::new(self.telescope.clone())));
        self
    }

    /// Trait-object handles for the orchestrator.
    pub fn devices(&self) -> Devices {
        Devices {
            telescope: self.telescope.clone(),
            camera: self.camera.clone(),
            dome: self.dome.clone().map(|d| d as Arc<dyn Dome>),
            solver: self.solver.clone(),
            alignment: self.alignment.clone(),
        }
    }
}
