//! Settings loading errors.

/// Convenience alias for settings results.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors raised while loading or parsing settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings at {path}: {reason}")]
    Read {
        /// Settings file path.
        path: String,
        /// Error description.
        reason: String,
    },
    /// The settings file is not valid JSON.
    #[error("failed to parse settings at {path}: {reason}")]
    Parse {
        /// Settings file path.
        path: String,
        /// Error description.
        reason: String,
    },
    /// The merged settings document does not match the schema.
    #[error("invalid settings: {reason}")]
    Invalid {
        /// Error description.
        reason: String,
    },
}
