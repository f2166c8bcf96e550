//! sdkprov - Android command-line SDK provisioner
//!
//! Entry point: parses arguments, installs logging, loads the configuration
//! and dispatches to a command.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use sdkprov::commands::{InitConfigCommand, ProvisionCommand, SourcesCommand, ValidateCommand};
use sdkprov::core::{ConsumerRole, HostArch, HostOs, ProvisionerConfig, VERSION};

#[derive(Parser)]
#[command(name = "sdkprov")]
#[command(about = "Provision a self-contained Android command-line SDK")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config.toml)
    #[arg(long, global = true, env = "SDKPROV_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Role {
    Host,
    Build,
}

impl From<Role> for ConsumerRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Host => ConsumerRole::Host,
            Role::Build => ConsumerRole::Build,
        }
    }
}

#[derive(Args, Clone)]
struct RequestArgs {
    /// Android platform API level
    #[arg(long)]
    platform: Option<u32>,

    /// Build-tools revision
    #[arg(long)]
    build_tools: Option<String>,

    /// Operating system the SDK tools run on
    #[arg(long)]
    os: Option<HostOs>,

    /// Architecture the SDK tools run on
    #[arg(long)]
    arch: Option<HostArch>,

    /// Consumer the environment is published for
    #[arg(long, value_enum, default_value = "host")]
    role: Role,

    /// Command-line tools version key in the source index
    #[arg(long)]
    cmdline_tools: Option<String>,
}

impl RequestArgs {
    fn apply(&self, config: &mut ProvisionerConfig) {
        if let Some(platform) = self.platform {
            config.sdk.platform_version = platform;
        }
        if let Some(revision) = &self.build_tools {
            config.sdk.build_tools_revision = revision.clone();
        }
        if let Some(version) = &self.cmdline_tools {
            config.sdk.cmdline_tools_version = version.clone();
        }

        let context = match self.role {
            Role::Host => &mut config.host,
            Role::Build => &mut config.build,
        };
        if let Some(os) = &self.os {
            context.os = Some(os.clone());
        }
        if let Some(arch) = &self.arch {
            context.arch = Some(arch.clone());
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download, install and package the SDK, then print its environment
    Provision {
        #[command(flatten)]
        request: RequestArgs,

        /// Working directory for extraction and installs
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Package output directory
        #[arg(long)]
        package_dir: Option<PathBuf>,

        /// Source index file merged over the built-in one
        #[arg(long)]
        source_index: Option<PathBuf>,

        /// JDK used to run sdkmanager
        #[arg(long, env = "SDKPROV_JAVA_HOME")]
        java_home: Option<PathBuf>,

        /// Per-invocation sdkmanager timeout in seconds, 0 for none
        #[arg(long)]
        timeout: Option<u64>,

        /// Write an executable shell script exporting the environment
        #[arg(long)]
        env_script: Option<PathBuf>,

        /// Write the environment as a dotenv file
        #[arg(long)]
        dotenv: Option<PathBuf>,

        /// Print the environment as JSON instead of shell exports
        #[arg(long)]
        json: bool,
    },
    /// Resolve and validate a request without provisioning
    Validate {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// List known command-line tools sources
    Sources {
        /// Source index file merged over the built-in one
        #[arg(long)]
        source_index: Option<PathBuf>,
    },
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

async fn load_config(path: Option<&PathBuf>) -> Result<ProvisionerConfig> {
    let config = match path {
        Some(path) => ProvisionerConfig::load_from(path).await?,
        None => ProvisionerConfig::load().await?,
    };
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Provision {
            request,
            work_dir,
            package_dir,
            source_index,
            java_home,
            timeout,
            env_script,
            dotenv,
            json,
        } => {
            let mut config = load_config(cli.config.as_ref()).await?;
            request.apply(&mut config);
            if work_dir.is_some() {
                config.paths.work_dir = work_dir;
            }
            if package_dir.is_some() {
                config.paths.package_dir = package_dir;
            }
            if source_index.is_some() {
                config.paths.source_index = source_index;
            }
            if java_home.is_some() {
                config.paths.java_home = java_home;
            }
            if let Some(secs) = timeout {
                config.subprocess.timeout_secs = secs;
            }

            ProvisionCommand {
                config,
                role: request.role.into(),
                env_script,
                dotenv,
                json,
            }
            .execute()
            .await?;
        }
        Commands::Validate { request } => {
            let mut config = load_config(cli.config.as_ref()).await?;
            request.apply(&mut config);
            ValidateCommand {
                config,
                role: request.role.into(),
            }
            .execute()?;
        }
        Commands::Sources { source_index } => {
            let mut config = load_config(cli.config.as_ref()).await?;
            if source_index.is_some() {
                config.paths.source_index = source_index;
            }
            SourcesCommand { config }.execute().await?;
        }
        Commands::InitConfig { force } => {
            InitConfigCommand {
                path: cli.config,
                force,
            }
            .execute()
            .await?;
        }
    }
    Ok(())
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    debug!("sdkprov v{} starting", VERSION);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
