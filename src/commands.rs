//! CLI commands for sdkprov
//!
//! Each command owns its resolved configuration and runs to completion in
//! `execute`. Argument parsing lives in `main.rs`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use sdkprov_android_toolchain::{
    resolve_java_home, DownloadConfig, EnvFileWriter, Provisioner, ProvisioningRun, RunLayout,
    SdkEnvironment, SdkManager, SourceIndex, ToolchainDownloader, ToolchainRequest,
};
use sdkprov_core::{ConsumerRole, ProvisionerConfig};

/// Built-in source index with the configured index file laid over it
pub async fn load_source_index(config: &ProvisionerConfig) -> Result<SourceIndex> {
    let mut index = SourceIndex::builtin();
    if let Some(path) = &config.paths.source_index {
        let extra = SourceIndex::load(path)
            .await
            .with_context(|| format!("Failed to load source index {:?}", path))?;
        index.merge(extra);
    }
    Ok(index)
}

fn download_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message("command-line tools");
    pb
}

/// Provision command options
pub struct ProvisionCommand {
    pub config: ProvisionerConfig,
    pub role: ConsumerRole,
    pub env_script: Option<PathBuf>,
    pub dotenv: Option<PathBuf>,
    pub json: bool,
}

impl ProvisionCommand {
    /// Provision the SDK and publish its environment. The request is
    /// validated before the source index or the JDK is looked up.
    pub async fn execute(&self) -> Result<SdkEnvironment> {
        let config = &self.config;
        let request = ToolchainRequest::from_config(config, self.role)?;
        let version = config.sdk.cmdline_tools_version.clone();
        let package_id = request.package_id(&version);
        let layout = RunLayout::for_package(&config.paths, &package_id)?;
        let mut run = ProvisioningRun::new(request, layout);
        run.validate()?;
        info!("Provisioning {} (package {})", run.request(), package_id);
        info!("Work directory: {:?}", run.layout().work_dir);
        info!("Package directory: {:?}", run.layout().package_dir);

        let index = load_source_index(config).await?;

        let pb = download_progress_bar();
        let progress = pb.clone();
        let downloader = ToolchainDownloader::new(DownloadConfig {
            scratch_dir: run.layout().scratch_dir(),
            verify_checksum: config.download.verify_checksum,
            timeout_secs: config.download.timeout_secs,
        })?
        .with_progress(Arc::new(move |downloaded, total| {
            if total > 0 {
                progress.set_length(total);
            }
            progress.set_position(downloaded);
        }));

        let driver = SdkManager::new()
            .with_java_home(resolve_java_home(config.paths.java_home.as_deref()))
            .with_timeout(config.subprocess.timeout());

        let provisioner = Provisioner::new(index, version, downloader, driver);
        let result = provisioner.provision(&mut run, self.role).await;
        pb.finish_and_clear();
        let env = result?;

        if let Some(path) = &self.env_script {
            EnvFileWriter::write_shell_script(path, &env)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
        }
        if let Some(path) = &self.dotenv {
            EnvFileWriter::write_dotenv(path, &env)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
        }

        if self.json {
            println!("{}", env.to_json()?);
        } else {
            print!("{}", env.shell_exports());
        }
        Ok(env)
    }
}

/// Validate command options
pub struct ValidateCommand {
    pub config: ProvisionerConfig,
    pub role: ConsumerRole,
}

impl ValidateCommand {
    /// Resolve and validate the request without touching the filesystem
    pub fn execute(&self) -> Result<ToolchainRequest> {
        let request = ToolchainRequest::from_config(&self.config, self.role)?;
        request.validate()?;
        println!("{}", request);
        println!(
            "package id: {}",
            request.package_id(&self.config.sdk.cmdline_tools_version)
        );
        Ok(request)
    }
}

/// Source listing command
pub struct SourcesCommand {
    pub config: ProvisionerConfig,
}

impl SourcesCommand {
    pub async fn execute(&self) -> Result<()> {
        let index = load_source_index(&self.config).await?;
        if index.is_empty() {
            println!("No sources known");
            return Ok(());
        }

        println!("{:<12} {:<8} {:<8} {:<10} URL", "VERSION", "OS", "ARCH", "SHA256");
        for (version, os, arch, source) in index.entries() {
            let checksum = source
                .sha256
                .as_deref()
                .map(|s| s.get(..8).unwrap_or(s))
                .unwrap_or("-");
            println!("{:<12} {:<8} {:<8} {:<10} {}", version, os, arch, checksum, source.url);
        }
        Ok(())
    }
}

/// Config initialization command
pub struct InitConfigCommand {
    pub path: Option<PathBuf>,
    pub force: bool,
}

impl InitConfigCommand {
    /// Write the default configuration, returning where it went
    pub async fn execute(&self) -> Result<PathBuf> {
        let path = match &self.path {
            Some(path) => path.clone(),
            None => ProvisionerConfig::config_file()
                .context("Cannot determine the default config path")?,
        };

        if path.exists() && !self.force {
            anyhow::bail!("{:?} already exists; pass --force to overwrite it", path);
        }

        ProvisionerConfig::default().save_to(&path).await?;
        println!("Wrote default configuration to {}", path.display());
        Ok(path)
    }
}
