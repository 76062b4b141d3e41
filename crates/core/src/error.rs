//! Typed configuration errors.
//!
//! Construction fails fast on invalid parameters so that no instruments
//! are ever monitored with a half-valid profile.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// No monitoring profiles configured.
    #[error("no monitoring profiles configured")]
    NoProfiles,

    /// A profile parameter failed validation.
    #[error("profile '{profile}': {message}")]
    InvalidProfile {
        /// Name of the offending profile.
        profile: String,
        /// What was wrong with it.
        message: String,
    },

    /// Two profiles share the same name.
    #[error("duplicate profile name '{0}'")]
    DuplicateProfile(String),

    /// Two profiles would monitor the same instrument subset.
    #[error("profiles '{first}' and '{second}' both select quote currency '{quote}'")]
    OverlappingProfiles {
        first: String,
        second: String,
        quote: String,
    },

    /// Daily refresh hour outside [0, 24).
    #[error("baseline refresh hour must be in [0, 24), got {0}")]
    InvalidRefreshHour(u32),

    /// Supervisor cadence below the scheduler minimum.
    #[error("supervisor interval must be at least 5 seconds, got {0}")]
    SupervisorIntervalTooShort(u64),

    /// Stop-loss ratio outside (0, 1).
    #[error("stop loss ratio must be in (0, 1), got {0}")]
    InvalidStopLossRatio(f64),

    /// A numeric parameter cannot be represented as a decimal.
    #[error("parameter '{name}' ({value}) cannot be represented as a decimal")]
    InvalidNumber { name: &'static str, value: f64 },
}

impl ConfigError {
    /// Creates an invalid-profile error.
    pub fn invalid_profile(profile: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidProfile {
            profile: profile.into(),
            message: message.into(),
        }
    }
}
