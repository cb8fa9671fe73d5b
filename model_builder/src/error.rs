//! Error types for model builds.
//!
//! Point-level problems (a failed slew, an unsolvable image, a residual above the
//! threshold) are never errors at this level: they are recorded on the point and the
//! build moves on. Only the failures that end a build surface as [`BuildError`].

use std::fmt;

/// Result type for whole-build operations.
pub type BuildResult<T> = Result<T, BuildError>;

/// Result type for collaborator (device, solver, alignment engine) calls.
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Structured context attached to build errors.
///
/// Mirrors what the log lines carry so a terminal error can be matched to the
/// warnings that preceded it.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// The operation being performed (e.g. "preflight", "finish_spec")
    pub operation: Option<String>,
    /// The point involved, if any
    pub point_id: Option<usize>,
    /// Additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with an operation name.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: Some(operation.into()),
            ..Default::default()
        }
    }

    /// Set the point id.
    pub fn with_point(mut self, point_id: usize) -> Self {
        self.point_id = Some(point_id);
        self
    }

    /// Set additional details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn is_empty(&self) -> bool {
        self.operation.is_none() && self.point_id.is_none() && self.details.is_none()
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let mut parts = Vec::new();
        if let Some(ref op) = self.operation {
            parts.push(format!("operation={}", op));
        }
        if let Some(id) = self.point_id {
            parts.push(format!("point={}", id));
        }
        if let Some(ref details) = self.details {
            parts.push(format!("details={}", details));
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Terminal build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A device is not connected or a point lies outside the legal numeric range.
    /// Raised before any hardware motion.
    #[error("Precondition failed: {message} {context}")]
    Precondition {
        message: String,
        context: ErrorContext,
    },

    /// The alignment engine refused to start or finish a spec.
    #[error("Alignment spec failure: {message} {context}")]
    SpecFailure {
        message: String,
        context: ErrorContext,
    },

    /// Not enough points made it into the model to fit anything.
    #[error("Insufficient points: {added} added, at least {required} required")]
    InsufficientPoints { added: usize, required: usize },

    /// The build was aborted by the hard-cancel signal.
    #[error("Operation was cancelled")]
    Cancelled,

    /// Broken internal invariant (illegal state transition, double dome slew).
    #[error("Internal error: {message} {context}")]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

impl BuildError {
    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
            context: ErrorContext::new("preflight"),
        }
    }

    /// Create a precondition error with context.
    pub fn precondition_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Precondition {
            message: message.into(),
            context,
        }
    }

    /// Create a spec failure for the given alignment operation.
    pub fn spec_failure(operation: &str, message: impl Into<String>) -> Self {
        Self::SpecFailure {
            message: message.into(),
            context: ErrorContext::new(operation),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    /// Create an internal error with context.
    pub fn internal_with_context(message: impl Into<String>, context: ErrorContext) -> Self {
        Self::Internal {
            message: message.into(),
            context,
        }
    }

    /// Whether this error is the hard-cancel signal rather than a true failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Errors reported by collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeviceError {
    #[error("{device} is not connected")]
    NotConnected { device: String },

    #[error("{device} operation '{operation}' failed: {message}")]
    OperationFailed {
        device: String,
        operation: String,
        message: String,
    },

    #[error("{device} timed out during '{operation}'")]
    Timeout { device: String, operation: String },
}

impl DeviceError {
    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected {
            device: device.into(),
        }
    }

    pub fn failed(
        device: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            device: device.into(),
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn timeout(device: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Timeout {
            device: device.into(),
            operation: operation.into(),
        }
    }
}

/// Invalid inputs to point generation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    #[error("Requested point count must be at least 1, got {0}")]
    InvalidPointCount(usize),

    #[error("Time window is invalid: {0}")]
    InvalidTimeWindow(String),

    #[error("RA delta must be at least 1 arcsecond, got {0} arcsec")]
    InvalidRaDelta(f64),
}

/// Configuration file and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No model_builder.toml found in standard locations")]
    NotFound,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_display() {
        let ctx = ErrorContext::new("finish_spec")
            .with_point(4)
            .with_details("engine busy");
        assert_eq!(
            ctx.to_string(),
            "[operation=finish_spec, point=4, details=engine busy]"
        );
    }

    #[test]
    fn test_empty_context_renders_nothing() {
        assert_eq!(ErrorContext::default().to_string(), "");
    }

    #[test]
    fn test_precondition_message() {
        let err = BuildError::precondition("Telescope is not connected");
        assert_eq!(
            err.to_string(),
            "Precondition failed: Telescope is not connected [operation=preflight]"
        );
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_cancelled_is_distinct() {
        assert!(BuildError::Cancelled.is_cancelled());
        assert_eq!(BuildError::Cancelled.to_string(), "Operation was cancelled");
    }

    #[test]
    fn test_insufficient_points_message() {
        let err = BuildError::InsufficientPoints {
            added: 2,
            required: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient points: 2 added, at least 3 required"
        );
    }

    #[test]
    fn test_device_error_display() {
        let err = DeviceError::failed("Dome", "slew", "shutter jammed");
        assert_eq!(
            err.to_string(),
            "Dome operation 'slew' failed: shutter jammed"
        );
        assert_eq!(
            DeviceError::not_connected("Camera").to_string(),
            "Camera is not connected"
        );
    }
}
