//! Simulated Pointing Model Build
//!
//! Generates alignment points from the configuration, runs a full build against
//! the in-memory observatory and prints a JSON report to stdout.
//!
//! # Usage
//!
//! ```bash
//! # Configuration from MODEL_BUILDER_CONFIG or model_builder.toml
//! cargo run --bin model-builder-sim
//!
//! # Explicit configuration file
//! cargo run --bin model-builder-sim -- path/to/model_builder.toml
//! ```
//!
//! The first Ctrl-C stops admitting new points and finalizes the model; a second
//! one aborts the build.
//!
//! # Environment Variables
//!
//! - `MODEL_BUILDER_CONFIG`: configuration file path
//! - `RUST_LOG`: Log level (default: info)

use std::env;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pointing_model_builder::builder::{BuildEnvironment, BuildOrchestrator};
use pointing_model_builder::config::{GenerationStrategy, ModelBuilderConfig};
use pointing_model_builder::devices::sim::SimulatedObservatory;
use pointing_model_builder::generator::{PointGenerator, SiderealPathRequest};
use pointing_model_builder::models::{EquatorialCoordinates, ModelPoint, ModelPointState};
use pointing_model_builder::progress::LogProgress;

fn generate_points(config: &ModelBuilderConfig) -> anyhow::Result<Vec<ModelPoint>> {
    let horizon = config.horizon_profile().context("loading horizon profile")?;
    let generator = PointGenerator::new(config.bounds, horizon);
    let settings = &config.generation;
    let points = match settings.strategy {
        GenerationStrategy::GoldenSpiral => generator.golden_spiral(settings.num_points)?,
        GenerationStrategy::SiderealPath => {
            let start = chrono::Utc::now();
            let end = start + chrono::Duration::seconds((settings.path_hours * 3600.0) as i64);
            let target =
                EquatorialCoordinates::new(settings.target_ra_hours, settings.target_dec_deg);
            let path = generator.sidereal_path(&SiderealPathRequest {
                target,
                ra_delta_deg: settings.ra_delta_deg,
                start,
                end,
                site: config.site,
                conditions: config.atmosphere,
                meridian_limits: config.meridian_limits,
            })?;
            info!(
                "Sidereal path: {} valid points with RA step {:.3}° after {} attempt(s)",
                path.valid_count(),
                path.ra_delta_deg,
                path.attempted_deltas.len()
            );
            path.points
        }
    };
    Ok(points)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(
            env::var("RUST_LOG")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(Level::INFO),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = match env::args().nth(1) {
        Some(path) => ModelBuilderConfig::from_file(&path)
            .with_context(|| format!("loading configuration from {}", path))?,
        None => ModelBuilderConfig::load().context("loading configuration")?,
    };

    let points = generate_points(&config)?;
    let eligible = points
        .iter()
        .filter(|p| p.state == ModelPointState::Generated)
        .count();
    info!("Generated {} points, {} eligible", points.len(), eligible);

    let observatory = SimulatedObservatory::from_settings(&config.simulator);
    let environment = BuildEnvironment::from_config(&config);
    let orchestrator = BuildOrchestrator::new(observatory.devices(), environment)
        .with_progress(Arc::new(LogProgress));

    let cancel = CancellationToken::new();
    let stop = CancellationToken::new();
    let signals = tokio::spawn({
        let cancel = cancel.clone();
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Stopping after admitted points, Ctrl-C again to abort");
            stop.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Aborting build");
                cancel.cancel();
            }
        }
    });

    let result = orchestrator
        .build(&points, &config.build, cancel, stop)
        .await;
    signals.abort();
    let outcome = result?;

    let report = json!({
        "build_id": outcome.build_id,
        "rms_arcsec": outcome.model.rms_arcsec,
        "points_in_model": outcome.model.point_count(),
        "stopped_early": outcome.stopped_early,
        "sync_offset": outcome.sync_offset,
        "iterations": outcome.iterations,
        "points": outcome.points.iter().map(|p| json!({
            "id": p.id,
            "altitude_deg": p.altitude_deg(),
            "azimuth_deg": p.azimuth_deg(),
            "state": p.state.as_str(),
            "residual_arcsec": p.capture.residual_arcsec,
        })).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
