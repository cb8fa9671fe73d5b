//! Progress reporting for running builds.
//!
//! The orchestrator pushes textual and percentage updates to a [`ProgressSink`].
//! Sinks are observational only: nothing they do feeds back into the build.
//! [`ProgressTracker`] is an in-memory sink that keeps per-build logs.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{ModelPoint, ModelPointState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One progress message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub build_id: Uuid,
    pub level: ProgressLevel,
    pub message: String,
    /// Completion of the current iteration, `0.0..=100.0`
    pub percent: Option<f64>,
}

/// Receiver of build progress.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);

    /// The point about to be visited changed. `None` once nothing is pending.
    fn next_point_changed(&self, build_id: Uuid, point: Option<&ModelPoint>);

    fn point_state_changed(&self, _build_id: Uuid, _point_id: usize, _state: ModelPointState) {}

    fn build_started(&self, _build_id: Uuid) {}

    fn build_finished(&self, _build_id: Uuid, _status: BuildStatus) {}
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _update: ProgressUpdate) {}

    fn next_point_changed(&self, _build_id: Uuid, _point: Option<&ModelPoint>) {}
}

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub timestamp: DateTime<Utc>,
    pub level: ProgressLevel,
    pub message: String,
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Everything observed about one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildProgress {
    pub build_id: Uuid,
    pub status: BuildStatus,
    pub logs: Vec<ProgressEntry>,
    pub next_point: Option<usize>,
    /// Point ids in the order they were announced as next
    pub visit_order: Vec<usize>,
    pub state_changes: Vec<(usize, ModelPointState)>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_percent: Option<f64>,
}

impl BuildProgress {
    fn new(build_id: Uuid) -> Self {
        Self {
            build_id,
            status: BuildStatus::Running,
            logs: Vec::new(),
            next_point: None,
            visit_order: Vec::new(),
            state_changes: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            last_percent: None,
        }
    }
}

/// In-memory progress tracker.
#[derive(Clone, Default)]
pub struct ProgressTracker {
    builds: Arc<RwLock<HashMap<Uuid, BuildProgress>>>,
}

impl ProgressTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn with_build<F: FnOnce(&mut BuildProgress)>(&self, build_id: Uuid, f: F) {
        let mut builds = self.builds.write();
        f(builds
            .entry(build_id)
            .or_insert_with(|| BuildProgress::new(build_id)));
    }

    /// Get a build by id.
    pub fn get(&self, build_id: Uuid) -> Option<BuildProgress> {
        self.builds.read().get(&build_id).cloned()
    }

    /// Get all logs for a build.
    pub fn logs(&self, build_id: Uuid) -> Vec<ProgressEntry> {
        self.builds
            .read()
            .get(&build_id)
            .map(|b| b.logs.clone())
            .unwrap_or_default()
    }

    /// Ids of every build seen so far.
    pub fn build_ids(&self) -> Vec<Uuid> {
        self.builds.read().keys().copied().collect()
    }

    /// The only build seen, when exactly one exists.
    pub fn single(&self) -> Option<BuildProgress> {
        let builds = self.builds.read();
        if builds.len() == 1 {
            builds.values().next().cloned()
        } else {
            None
        }
    }
}

impl ProgressSink for ProgressTracker {
    fn report(&self, update: ProgressUpdate) {
        self.with_build(update.build_id, |b| {
            if update.percent.is_some() {
                b.last_percent = update.percent;
            }
            b.logs.push(ProgressEntry {
                timestamp: Utc::now(),
                level: update.level,
                message: update.message,
                percent: update.percent,
            });
        });
    }

    fn next_point_changed(&self, build_id: Uuid, point: Option<&ModelPoint>) {
        self.with_build(build_id, |b| {
            b.next_point = point.map(|p| p.id);
            if let Some(p) = point {
                b.visit_order.push(p.id);
            }
        });
    }

    fn point_state_changed(&self, build_id: Uuid, point_id: usize, state: ModelPointState) {
        self.with_build(build_id, |b| b.state_changes.push((point_id, state)));
    }

    fn build_started(&self, build_id: Uuid) {
        self.with_build(build_id, |b| b.status = BuildStatus::Running);
    }

    fn build_finished(&self, build_id: Uuid, status: BuildStatus) {
        self.with_build(build_id, |b| {
            b.status = status;
            b.completed_at = Some(Utc::now());
        });
    }
}

/// Forwards progress to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, update: ProgressUpdate) {
        let tag = &update.build_id.simple().to_string()[..8];
        match (update.level, update.percent) {
            (ProgressLevel::Warning, _) => log::warn!("[{}] {}", tag, update.message),
            (ProgressLevel::Error, _) => log::error!("[{}] {}", tag, update.message),
            (_, Some(p)) => log::info!("[{}] {} ({:.0}%)", tag, update.message, p),
            (_, None) => log::info!("[{}] {}", tag, update.message),
        }
    }

    fn next_point_changed(&self, build_id: Uuid, point: Option<&ModelPoint>) {
        if let Some(p) = point {
            log::debug!(
                "[{}] next point {} alt={:.2} az={:.2}",
                &build_id.simple().to_string()[..8],
                p.id,
                p.altitude_deg(),
                p.azimuth_deg()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_records_updates() {
        let tracker = ProgressTracker::new();
        let id = Uuid::new_v4();
        tracker.build_started(id);
        tracker.report(ProgressUpdate {
            build_id: id,
            level: ProgressLevel::Info,
            message: "iteration 1".into(),
            percent: Some(40.0),
        });
        let p = ModelPoint::new(3, 40.0, 10.0, ModelPointState::Generated);
        tracker.next_point_changed(id, Some(&p));
        tracker.next_point_changed(id, None);
        tracker.build_finished(id, BuildStatus::Completed);

        let build = tracker.get(id).unwrap();
        assert_eq!(build.status, BuildStatus::Completed);
        assert_eq!(build.logs.len(), 1);
        assert_eq!(build.last_percent, Some(40.0));
        assert_eq!(build.visit_order, vec![3]);
        assert_eq!(build.next_point, None);
        assert!(build.completed_at.is_some());
    }

    #[test]
    fn test_unknown_build_has_no_logs() {
        let tracker = ProgressTracker::new();
        assert!(tracker.logs(Uuid::new_v4()).is_empty());
        assert!(tracker.single().is_none());
    }
}
