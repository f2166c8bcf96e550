//! Provisioning errors
//!
//! One variant family per failure class: configuration, missing source,
//! fetch, subprocess, packaging. [`RunFailure`] adds the stage that failed.

use std::path::PathBuf;

use sdkprov_core::CoreError;

use crate::pipeline::{RunState, Stage};
use crate::sdk_manager::SdkStep;

/// Invalid provisioning request
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Unsupported Android platform version: {level} (supported [{min} ... {max}])")]
    ApiLevelOutOfRange { level: u32, min: u32, max: u32 },
    #[error("Unsupported build os: {0}. Supported are: Windows, Macos, Linux")]
    UnsupportedOs(String),
    #[error("Unsupported build arch: {0}. Supported is: x86_64")]
    UnsupportedArch(String),
    #[error(transparent)]
    Settings(#[from] CoreError),
}

/// Archive download and extraction errors
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status} while downloading {url}")]
    HttpStatus { url: String, status: u16 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("Unsupported archive format for {0} (expected .zip, .tar.gz, .tgz or .tar)")]
    UnsupportedFormat(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("Background task failed: {0}")]
    Join(String),
}

/// Errors raised by a provisioning run
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("No known source for command-line tools '{version}' on {os}/{arch}")]
    SourceNotFound {
        version: String,
        os: String,
        arch: String,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to launch sdkmanager for {step}")]
    Spawn {
        step: SdkStep,
        #[source]
        source: std::io::Error,
    },

    #[error("sdkmanager {step} failed with {status}")]
    Subprocess { step: SdkStep, status: String },

    #[error("sdkmanager {step} did not finish within {secs}s and was killed")]
    SubprocessTimeout { step: SdkStep, secs: u64 },

    #[error("Missing '{subtree}' in SDK root at {path:?}; an earlier install step did not complete")]
    Packaging { subtree: &'static str, path: PathBuf },

    #[error("Run is in state {actual}, expected {expected}")]
    InvalidState { expected: RunState, actual: RunState },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProvisionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        ProvisionError::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<CoreError> for ProvisionError {
    fn from(err: CoreError) -> Self {
        ProvisionError::Configuration(ConfigurationError::Settings(err))
    }
}

/// A provisioning run that stopped at a stage
#[derive(Debug, thiserror::Error)]
#[error("Android SDK provisioning failed during {stage}")]
pub struct RunFailure {
    pub stage: Stage,
    #[source]
    pub error: ProvisionError,
}

/// `err` followed by each of its causes, joined with ": "
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::ErrorKind;

    fn not_found() -> std::io::Error {
        std::io::Error::new(ErrorKind::NotFound, "no such file")
    }

    #[test]
    fn test_each_cause_printed_once() {
        let failure = RunFailure {
            stage: Stage::Package,
            error: ProvisionError::io("Failed to copy \"licenses\"", not_found()),
        };
        let chain = error_chain(&failure);
        assert_eq!(
            chain,
            "Android SDK provisioning failed during packaging: Failed to copy \"licenses\": no such file"
        );
        assert_eq!(chain.matches("no such file").count(), 1);

        let spawn = ProvisionError::Spawn {
            step: SdkStep::AcceptLicenses,
            source: not_found(),
        };
        assert_eq!(spawn.to_string(), "Failed to launch sdkmanager for license acceptance");
        assert_eq!(error_chain(&spawn).matches("no such file").count(), 1);
    }

    #[test]
    fn test_transparent_variants_keep_the_inner_message() {
        let config = ProvisionError::from(ConfigurationError::ApiLevelOutOfRange {
            level: 99,
            min: 7,
            max: 32,
        });
        assert_eq!(
            error_chain(&config),
            "Unsupported Android platform version: 99 (supported [7 ... 32])"
        );

        let fetch = ProvisionError::from(FetchError::from(not_found()));
        assert_eq!(error_chain(&fetch), "no such file");
    }
}
