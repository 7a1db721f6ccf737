use thiserror::Error;

use crate::session::SessionStatus;

/// Failures surfaced while capturing, enrolling or scoring.
///
/// None of these end a [`CallSession`](crate::CallSession): each one is
/// caught where it happens and turned into a degraded path or a skipped tick.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The capture stream could not be opened. Verification is disabled for
    /// the rest of the session.
    #[error("capture permission denied: {0}")]
    PermissionDenied(String),

    /// The biometric backend is missing or could not be initialized.
    #[error("biometric backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A single enroll/export/verify call failed.
    #[error("biometric backend {op} failed: {message}")]
    BackendCallFailure { op: &'static str, message: String },

    /// There is nothing to compare the sample against.
    #[error("scoring indeterminate: {0}")]
    ScoringIndeterminate(String),
}

/// Errors returned by [`BiometricBackend`](crate::BiometricBackend)
/// implementations.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("invalid access key")]
    InvalidKey,

    #[error("invalid profile data: {0}")]
    InvalidProfile(String),

    #[error("{0}")]
    Failed(String),
}

impl BackendError {
    /// Converts a failed backend call into the engine's taxonomy.
    pub fn into_call_failure(self, op: &'static str) -> VerifyError {
        VerifyError::BackendCallFailure {
            op,
            message: self.to_string(),
        }
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("match_threshold must be finite, got {0}")]
    InvalidThreshold(f32),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Lifecycle errors returned by [`CallSession`](crate::CallSession).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),
}
