//! Device state captured before a build and put back afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};

use crate::devices::{Devices, Dome};
use crate::error::{DeviceError, DeviceResult};
use crate::models::EquatorialCoordinates;

/// Upper bound on any single restore call.
const RESTORE_TIMEOUT: Duration = Duration::from_secs(180);

async fn bounded<T>(
    device: &str,
    operation: &str,
    fut: impl Future<Output = DeviceResult<T>>,
) -> DeviceResult<T> {
    match tokio::time::timeout(RESTORE_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeviceError::timeout(device, operation)),
    }
}

/// What the devices looked like before the build touched them.
///
/// Every field is optional: a value that could not be read is not restored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub telescope_position: Option<EquatorialCoordinates>,
    pub was_parked: Option<bool>,
    /// Outer `None` when the filter could not be read
    pub camera_filter: Option<Option<String>>,
    pub dome_follow: Option<bool>,
    pub refraction_correction: Option<bool>,
}

impl DeviceSnapshot {
    pub async fn capture(devices: &Devices, dome: Option<&Arc<dyn Dome>>, tag: &str) -> Self {
        let telescope = &devices.telescope;
        let snapshot = Self {
            telescope_position: read(tag, "telescope position", telescope.coordinates()).await,
            was_parked: read(tag, "park state", telescope.is_parked()).await,
            camera_filter: read(tag, "camera filter", devices.camera.current_filter()).await,
            dome_follow: match dome {
                Some(dome) => read(tag, "dome follow", dome.follow_enabled()).await,
                None => None,
            },
            refraction_correction: read(
                tag,
                "refraction correction",
                telescope.refraction_correction(),
            )
            .await,
        };
        debug!("[{}] captured device state {:?}", tag, snapshot);
        snapshot
    }

    /// Put every captured value back. Failures are logged and skipped.
    pub async fn restore(&self, devices: &Devices, dome: Option<&Arc<dyn Dome>>, tag: &str) {
        let telescope = &devices.telescope;

        if let Some(enabled) = self.refraction_correction {
            let result = bounded(
                "Telescope",
                "set_refraction_correction",
                telescope.set_refraction_correction(enabled),
            )
            .await;
            report(tag, "refraction correction", result);
        }

        if let Some(filter) = &self.camera_filter {
            let camera = &devices.camera;
            let result = bounded("Camera", "set_filter", camera.set_filter(filter.clone())).await;
            report(tag, "camera filter", result);
        }

        if let (Some(dome), Some(follow)) = (dome, self.dome_follow) {
            let result = bounded("Dome", "set_follow", dome.set_follow(follow)).await;
            report(tag, "dome follow", result);
        }

        if self.was_parked == Some(true) {
            let result = bounded("Telescope", "park", telescope.park()).await;
            report(tag, "telescope park", result);
        } else if let Some(position) = self.telescope_position {
            match bounded("Telescope", "slew", telescope.slew_to_coordinates(position)).await {
                Ok(true) => debug!("[{}] telescope returned to {}", tag, position),
                Ok(false) => warn!("[{}] telescope refused to return to {}", tag, position),
                Err(e) => warn!(
                    "[{}] failed to return telescope to {}: {}",
                    tag, position, e
                ),
            }
        }
    }
}

async fn read<T>(tag: &str, what: &str, fut: impl Future<Output = DeviceResult<T>>) -> Option<T> {
    match fut.await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("[{}] could not read {} before build: {}", tag, what, e);
            None
        }
    }
}

fn report(tag: &str, what: &str, result: DeviceResult<()>) {
    if let Err(e) = result {
        warn!("[{}] failed to restore {}: {}", tag, what, e);
    }
}

#[cfg(all(test, feature = "simulator"))]
mod tests {
    use super::*;
    use crate::devices::sim::{SimDome, SimulatedObservatory};
    use crate::devices::{Camera, Telescope};

    #[tokio::test]
    async fn test_restore_returns_devices_to_captured_state() {
        let obs = SimulatedObservatory::new(4.0)
            .with_camera(|c| c.with_filter("L"))
            .with_dome(SimDome::new(90.0));
        let devices = obs.devices();
        let dome = devices.dome.clone();
        let start = obs.telescope.reported();

        let snapshot = DeviceSnapshot::capture(&devices, dome.as_ref(), "test").await;
        assert_eq!(snapshot.camera_filter, Some(Some("L".to_string())));
        assert_eq!(snapshot.was_parked, Some(false));

        obs.telescope
            .slew_to_coordinates(EquatorialCoordinates::new(1.0, 20.0))
            .await
            .unwrap();
        obs.telescope
            .set_refraction_correction(false)
            .await
            .unwrap();
        obs.camera.set_filter(Some("R".to_string())).await.unwrap();
        dome.as_ref().unwrap().set_follow(false).await.unwrap();

        snapshot.restore(&devices, dome.as_ref(), "test").await;
        assert_eq!(obs.telescope.reported(), start);
        assert!(obs.telescope.refraction_enabled());
        assert_eq!(obs.camera.filter(), Some("L".to_string()));
        assert!(obs.dome.as_ref().unwrap().follow());
    }

    #[tokio::test]
    async fn test_parked_mount_is_parked_again() {
        let obs = SimulatedObservatory::new(4.0);
        obs.telescope.set_parked(true);
        let devices = obs.devices();
        let snapshot = DeviceSnapshot::capture(&devices, None, "test").await;

        obs.telescope.unpark().await.unwrap();
        snapshot.restore(&devices, None, "test").await;
        assert!(obs.telescope.is_parked_now());
        assert_eq!(obs.telescope.park_calls(), 1);
        assert!(obs.telescope.slews().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_values_are_skipped() {
        let obs = SimulatedObservatory::new(4.0);
        obs.telescope.set_connected(false);
        let devices = obs.devices();
        let snapshot = DeviceSnapshot::capture(&devices, None, "test").await;
        assert_eq!(snapshot.telescope_position, None);
        assert_eq!(snapshot.was_parked, None);

        obs.telescope.set_connected(true);
        snapshot.restore(&devices, None, "test").await;
        assert!(obs.telescope.slews().is_empty());
    }
}
