//! Error types for the settings crate.
//!
//! Loading and saving go through [`SettingsError`]; value validation reports
//! through the workspace-wide [`stencilforge_core::Error::InvalidConfig`] so
//! the pipeline can surface it unchanged.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading or saving a configuration file.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// The configuration file extension is not supported.
    #[error("Unsupported config format: {0} (expected .json or .toml)")]
    UnsupportedFormat(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("TOML error: {0}")]
    TomlSerError(#[from] toml::ser::Error),

    /// A loaded value failed validation.
    #[error(transparent)]
    Validation(#[from] stencilforge_core::Error),
}

/// Result type alias for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

impl From<SettingsError> for stencilforge_core::Error {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Validation(inner) => inner,
            SettingsError::IoError(io) => stencilforge_core::Error::Io(io),
            other => stencilforge_core::Error::invalid_config("file", other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_error_display() {
        let err = SettingsError::UnsupportedFormat("yaml".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported config format: yaml (expected .json or .toml)"
        );
    }

    #[test]
    fn test_validation_passes_through() {
        let inner = stencilforge_core::Error::invalid_config("thickness_mm", "must be > 0");
        let err: SettingsError = inner.into();
        let back: stencilforge_core::Error = err.into();
        assert!(back.is_config());
        assert_eq!(back.to_string(), "Invalid configuration: thickness_mm must be > 0");
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let settings_err: SettingsError = io_err.into();
        assert!(matches!(settings_err, SettingsError::IoError(_)));
    }
}
