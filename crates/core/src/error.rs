//! Error types for sdkprov configuration
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// Configuration loading and resolution errors
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("TOML parse error")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error(
        "Setting in {context} context with name {setting} is missing. \
         Make sure to provide it in the [{context}] section of your configuration."
    )]
    MissingSetting {
        setting: &'static str,
        context: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, CoreError>;
