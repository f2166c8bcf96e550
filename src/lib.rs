//! sdkprov - Android command-line SDK provisioning
//!
//! Materializes a self-contained Android SDK (platform, build-tools,
//! licenses and command-line tools) for a requested API level and
//! build-tools revision, and publishes the environment that points
//! downstream builds at it.
//!
//! ## Architecture
//!
//! - `sdkprov-core`: host platform model and TOML configuration
//! - `sdkprov-android-toolchain`: the provisioning pipeline

#![warn(clippy::all)]

pub mod commands;

pub use sdkprov_android_toolchain as toolchain;
pub use sdkprov_core as core;

/// Prelude module for convenient imports
pub mod prelude {
    pub use sdkprov_android_toolchain::{
        Provisioner, ProvisioningRun, RunLayout, SdkEnvironment, SdkManager, SourceIndex,
        ToolchainDownloader, ToolchainRequest,
    };
    pub use sdkprov_core::{ConsumerRole, HostArch, HostOs, ProvisionerConfig};
}
