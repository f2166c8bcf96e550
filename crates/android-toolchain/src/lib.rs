//! Android Toolchain Provisioning
//!
//! Materializes a command-line Android SDK for one platform API level and
//! build-tools revision:
//! - Request validation and the command-line tools source index
//! - Archive download, verification and extraction
//! - Permission remediation of the extracted tools
//! - sdkmanager license acceptance and package installs
//! - Packaging and environment publication

pub mod downloader;
pub mod env;
pub mod error;
pub mod extract;
pub mod java;
pub mod packager;
pub mod permissions;
pub mod pipeline;
pub mod request;
pub mod sdk_manager;
pub mod sources;

pub use downloader::{ArchiveFetcher, DownloadConfig, ProgressCallback, ToolchainDownloader};
pub use env::{EnvFileWriter, SdkEnvironment};
pub use error::{error_chain, ConfigurationError, FetchError, ProvisionError, RunFailure};
pub use java::resolve_java_home;
pub use packager::PACKAGE_SUBTREES;
pub use permissions::{remediate_permissions, FileSignature, RemediationReport};
pub use pipeline::{PackageStatus, Provisioner, ProvisioningRun, RunLayout, RunState, Stage};
pub use request::ToolchainRequest;
pub use sdk_manager::{SdkComponent, SdkDriver, SdkInvocation, SdkManager, SdkStep};
pub use sources::{ArchiveFormat, SourceDescriptor, SourceIndex};

/// Lowest supported platform API level
pub const MIN_API_LEVEL: u32 = 7;

/// Highest supported platform API level
pub const MAX_API_LEVEL: u32 = 32;
