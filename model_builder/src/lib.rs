//! # Pointing Model Builder
//!
//! Orchestrates telescope pointing-model builds.
//!
//! A build visits a set of sky positions, captures and plate-solves an image at
//! each one, and registers the correspondence between where the mount believed it
//! pointed and where the image shows it pointed with an alignment engine, which
//! fits the pointing model. This crate plans the positions, orders them, keeps a
//! dome slit in front of the telescope, overlaps solving with slewing, and retries
//! failures until the model converges or the retry budget runs out.
//!
//! ## Architecture
//!
//! - [`generator`]: golden-spiral and sidereal-path point generation, with horizon
//!   and bounds classification
//! - [`dome`]: slit aperture ranges and dome targets for offset mounts
//! - [`ordering`]: the visiting order of points
//! - [`builder`]: the build orchestrator and its per-build state
//! - [`devices`]: collaborator traits (mount, camera, dome, plate solver, alignment
//!   engine) and, with the `simulator` feature, in-memory implementations
//! - [`progress`]: progress sinks
//! - [`astro`]: sidereal time, coordinate transforms, refraction and horizons
//! - [`config`]: `model_builder.toml` configuration
//!
//! ## Example
//!
//! ```no_run
//! # #[cfg(feature = "simulator")]
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use pointing_model_builder::builder::{BuildEnvironment, BuildOrchestrator};
//! use pointing_model_builder::config::BuildOptions;
//! use pointing_model_builder::devices::sim::SimulatedObservatory;
//! use pointing_model_builder::generator::PointGenerator;
//! use tokio_util::sync::CancellationToken;
//!
//! let points = PointGenerator::default().golden_spiral(20)?;
//! let observatory = SimulatedObservatory::new(6.0);
//! let orchestrator = BuildOrchestrator::new(observatory.devices(), BuildEnvironment::default());
//! let outcome = orchestrator
//!     .build(&points, &BuildOptions::default(), CancellationToken::new(), CancellationToken::new())
//!     .await?;
//! println!("RMS {:.2}\"", outcome.model.rms_arcsec);
//! # Ok(())
//! # }
//! ```

pub mod astro;
pub mod builder;
pub mod config;
pub mod devices;
pub mod dome;
pub mod error;
pub mod generator;
pub mod models;
pub mod ordering;
pub mod progress;

pub use builder::{BuildEnvironment, BuildOrchestrator, BuildOutcome};
pub use config::{BuildOptions, ModelBuilderConfig};
pub use error::{BuildError, BuildResult, ConfigError, DeviceError, GeneratorError};
pub use models::{ModelPoint, ModelPointState};
