//! sdkprov Core - platform model and configuration
//!
//! Shared types for every provisioning crate: the build host platform,
//! the TOML configuration with its host/build contexts, and configuration errors.

pub mod config;
pub mod error;
pub mod platform;

pub use config::{
    ConsumerRole, ContextSettings, DownloadSettings, PathSettings, ProvisionerConfig,
    SdkSettings, SettingsSource, SubprocessSettings, FALLBACK_RULES,
};
pub use error::{CoreError, Result};
pub use platform::{HostArch, HostOs, Platform};

/// sdkprov version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
