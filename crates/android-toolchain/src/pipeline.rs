//! Provisioning Pipeline
//!
//! A run moves linearly through
//! validate, fetch, remediate, accept licenses, install, package and publish.
//! Each stage checks the state it starts from and either advances the run or
//! records where it failed. There is no retry and no rollback.

use std::fmt;
use std::path::PathBuf;

use sdkprov_core::{ConsumerRole, CoreError, PathSettings, ProvisionerConfig};
use tracing::{debug, info, warn};

use crate::downloader::ArchiveFetcher;
use crate::env::SdkEnvironment;
use crate::error::{error_chain, ProvisionError, RunFailure};
use crate::packager::copy_package;
use crate::permissions::{remediate_permissions, RemediationReport};
use crate::request::ToolchainRequest;
use crate::sdk_manager::{sdkmanager_path, SdkComponent, SdkDriver, SdkInvocation, SdkStep};
use crate::sources::SourceIndex;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Validate,
    Fetch,
    Remediate,
    AcceptLicenses,
    InstallPackages,
    Package,
    Publish,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Fetch => "fetch",
            Stage::Remediate => "permission remediation",
            Stage::AcceptLicenses => "license acceptance",
            Stage::InstallPackages => "package installation",
            Stage::Package => "packaging",
            Stage::Publish => "publish",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    Unvalidated,
    Validated,
    Fetched,
    Remediated,
    LicensesAccepted,
    PackagesInstalled,
    Packaged,
    Published,
    Failed { stage: Stage, reason: String },
}

impl RunState {
    pub fn is_failed(&self) -> bool {
        matches!(self, RunState::Failed { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Unvalidated => f.write_str("unvalidated"),
            RunState::Validated => f.write_str("validated"),
            RunState::Fetched => f.write_str("fetched"),
            RunState::Remediated => f.write_str("remediated"),
            RunState::LicensesAccepted => f.write_str("licenses accepted"),
            RunState::PackagesInstalled => f.write_str("packages installed"),
            RunState::Packaged => f.write_str("packaged"),
            RunState::Published => f.write_str("published"),
            RunState::Failed { stage, reason } => write!(f, "failed during {}: {}", stage, reason),
        }
    }
}

/// Outcome of [`ProvisioningRun::package`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    Copied,
    AlreadyPackaged,
}

/// Directories owned by one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub work_dir: PathBuf,
    pub package_dir: PathBuf,
}

impl RunLayout {
    pub fn new(work_dir: impl Into<PathBuf>, package_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            package_dir: package_dir.into(),
        }
    }

    /// Configured directories, or per-package defaults under the user's
    /// cache and data directories
    pub fn for_package(paths: &PathSettings, package_id: &str) -> Result<Self, ProvisionError> {
        let work_dir = match &paths.work_dir {
            Some(dir) => dir.clone(),
            None => ProvisionerConfig::cache_dir()
                .map(|dir| dir.join("work").join(package_id))
                .ok_or_else(|| CoreError::Config("Cannot determine default work directory".into()))?,
        };
        let package_dir = match &paths.package_dir {
            Some(dir) => dir.clone(),
            None => ProvisionerConfig::data_dir()
                .map(|dir| dir.join("packages").join(package_id))
                .ok_or_else(|| CoreError::Config("Cannot determine default package directory".into()))?,
        };
        Ok(Self::new(work_dir, package_dir))
    }

    /// SDK root that sdkmanager installs into
    pub fn sdk_root(&self) -> PathBuf {
        self.work_dir.join("sdk")
    }

    /// Extracted command-line tools
    pub fn tools_dir(&self) -> PathBuf {
        self.sdk_root().join("tools")
    }

    /// Isolated user home for sdkmanager
    pub fn user_home(&self) -> PathBuf {
        self.work_dir.join("userhome")
    }

    /// Temporary downloads
    pub fn scratch_dir(&self) -> PathBuf {
        self.work_dir.join("downloads")
    }

    pub fn sdkmanager(&self) -> PathBuf {
        sdkmanager_path(&self.tools_dir())
    }

    /// User home published to consumers of the package
    pub fn package_user_home(&self) -> PathBuf {
        self.package_dir.join("userhome")
    }
}

/// One provisioning run: request, directories and progress
#[derive(Debug, Clone)]
pub struct ProvisioningRun {
    request: ToolchainRequest,
    layout: RunLayout,
    state: RunState,
}

impl ProvisioningRun {
    pub fn new(request: ToolchainRequest, layout: RunLayout) -> Self {
        Self {
            request,
            layout,
            state: RunState::Unvalidated,
        }
    }

    pub fn request(&self) -> &ToolchainRequest {
        &self.request
    }

    pub fn layout(&self) -> &RunLayout {
        &self.layout
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Refuse to start `stage` unless the run is in one of `allowed`.
    /// The first allowed state is reported as the expected one.
    fn require(&self, stage: Stage, allowed: &[RunState]) -> Result<(), RunFailure> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(RunFailure {
            stage,
            error: ProvisionError::InvalidState {
                expected: allowed.first().cloned().unwrap_or(RunState::Unvalidated),
                actual: self.state.clone(),
            },
        })
    }

    fn finish<T>(
        &mut self,
        stage: Stage,
        result: Result<T, ProvisionError>,
        next: RunState,
    ) -> Result<T, RunFailure> {
        match result {
            Ok(value) => {
                info!("Stage {} done, run is {}", stage, next);
                self.state = next;
                Ok(value)
            }
            Err(error) => {
                let reason = error_chain(&error);
                warn!("Stage {} failed: {}", stage, reason);
                self.state = RunState::Failed { stage, reason };
                Err(RunFailure { stage, error })
            }
        }
    }

    fn invocation(&self, step: SdkStep) -> SdkInvocation {
        SdkInvocation {
            step,
            sdkmanager: self.layout.sdkmanager(),
            sdk_root: self.layout.sdk_root(),
            user_home: self.layout.user_home(),
        }
    }

    /// Check the request. Nothing touches the filesystem or network before this.
    pub fn validate(&mut self) -> Result<(), RunFailure> {
        self.require(Stage::Validate, &[RunState::Unvalidated])?;
        info!("Validating {}", self.request);
        let result = self.request.validate().map_err(ProvisionError::from);
        self.finish(Stage::Validate, result, RunState::Validated)
    }

    /// Resolve the command-line tools source and extract it into the tools dir
    pub async fn fetch<F: ArchiveFetcher>(
        &mut self,
        index: &SourceIndex,
        version: &str,
        fetcher: &F,
    ) -> Result<(), RunFailure> {
        self.require(Stage::Fetch, &[RunState::Validated])?;
        let result = async {
            let source = index.resolve(
                version,
                self.request.host_os(),
                self.request.host_arch(),
            )?;
            let tools_dir = self.layout.tools_dir();
            info!("Fetching command-line tools {} from {}", version, source.url);
            fetcher.fetch(source, &tools_dir).await?;
            Ok::<(), ProvisionError>(())
        }
        .await;
        self.finish(Stage::Fetch, result, RunState::Fetched)
    }

    /// Restore executable bits in the extracted tools
    pub async fn remediate(&mut self) -> Result<RemediationReport, RunFailure> {
        self.require(Stage::Remediate, &[RunState::Fetched])?;
        let tools_dir = self.layout.tools_dir();
        let result = tokio::task::spawn_blocking(move || remediate_permissions(&tools_dir))
            .await
            .unwrap_or_else(|e| {
                Err(ProvisionError::io(
                    "Permission remediation task failed",
                    std::io::Error::other(e),
                ))
            });
        self.finish(Stage::Remediate, result, RunState::Remediated)
    }

    pub async fn accept_licenses<D: SdkDriver>(&mut self, driver: &D) -> Result<(), RunFailure> {
        self.require(Stage::AcceptLicenses, &[RunState::Remediated])?;
        let invocation = self.invocation(SdkStep::AcceptLicenses);
        let result = driver.run(&invocation).await;
        self.finish(Stage::AcceptLicenses, result, RunState::LicensesAccepted)
    }

    /// Install the platform, the build-tools and platform-tools, in that order.
    /// The first failing install stops the stage.
    pub async fn install_packages<D: SdkDriver>(&mut self, driver: &D) -> Result<(), RunFailure> {
        self.require(Stage::InstallPackages, &[RunState::LicensesAccepted])?;
        let components = [
            SdkComponent::Platform(self.request.platform_api_level()),
            SdkComponent::BuildTools(self.request.build_tools_revision().to_string()),
            SdkComponent::PlatformTools,
        ];
        let result = async {
            for component in components {
                driver.run(&self.invocation(SdkStep::Install(component))).await?;
            }
            Ok::<(), ProvisionError>(())
        }
        .await;
        self.finish(Stage::InstallPackages, result, RunState::PackagesInstalled)
    }

    /// Copy the installed SDK into the package directory, once per run
    pub async fn package(&mut self) -> Result<PackageStatus, RunFailure> {
        if matches!(self.state, RunState::Packaged | RunState::Published) {
            debug!("Package {:?} already copied in this run", self.layout.package_dir);
            return Ok(PackageStatus::AlreadyPackaged);
        }
        self.require(Stage::Package, &[RunState::PackagesInstalled])?;

        let sdk_root = self.layout.sdk_root();
        let package_dir = self.layout.package_dir.clone();
        info!("Packaging {:?} into {:?}", sdk_root, package_dir);
        let result = tokio::task::spawn_blocking(move || copy_package(&sdk_root, &package_dir))
            .await
            .unwrap_or_else(|e| {
                Err(ProvisionError::io("Packaging task failed", std::io::Error::other(e)))
            })
            .map(|()| PackageStatus::Copied);
        self.finish(Stage::Package, result, RunState::Packaged)
    }

    /// Environment describing the package to a consumer in `role`
    pub fn publish(&mut self, role: ConsumerRole) -> Result<SdkEnvironment, RunFailure> {
        self.require(Stage::Publish, &[RunState::Packaged, RunState::Published])?;
        let env = SdkEnvironment::publish(&self.layout.package_dir, &self.request, role);
        self.finish(Stage::Publish, Ok(env), RunState::Published)
    }
}

/// Runs every stage with a fixed source index and collaborators
pub struct Provisioner<F, D> {
    index: SourceIndex,
    cmdline_tools_version: String,
    fetcher: F,
    driver: D,
}

impl<F: ArchiveFetcher, D: SdkDriver> Provisioner<F, D> {
    pub fn new(
        index: SourceIndex,
        cmdline_tools_version: impl Into<String>,
        fetcher: F,
        driver: D,
    ) -> Self {
        Self {
            index,
            cmdline_tools_version: cmdline_tools_version.into(),
            fetcher,
            driver,
        }
    }

    pub fn index(&self) -> &SourceIndex {
        &self.index
    }

    /// Drive `run` from validation, or from an already validated state,
    /// to publication
    pub async fn provision(
        &self,
        run: &mut ProvisioningRun,
        role: ConsumerRole,
    ) -> Result<SdkEnvironment, RunFailure> {
        if run.state() == &RunState::Unvalidated {
            run.validate()?;
        }
        run.fetch(&self.index, &self.cmdline_tools_version, &self.fetcher)
            .await?;
        let report = run.remediate().await?;
        debug!("Marked {} of {} files executable", report.marked, report.scanned);
        run.accept_licenses(&self.driver).await?;
        run.install_packages(&self.driver).await?;
        run.package().await?;
        let env = run.publish(role)?;
        info!("Android SDK ready at {:?}", run.layout().package_dir);
        Ok(env)
    }
}
