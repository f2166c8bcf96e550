//! SDK Manager
//!
//! Drives the bundled `sdkmanager` to accept licenses and install packages.
//! Every invocation targets an explicit SDK root and an isolated user home.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ProvisionError;

/// SDK component types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkComponent {
    Platform(u32),      // platforms;android-XX
    BuildTools(String), // build-tools;XX.X.X
    PlatformTools,      // platform-tools
}

impl SdkComponent {
    /// Get the SDK manager package name
    pub fn package_name(&self) -> String {
        match self {
            SdkComponent::Platform(api) => format!("platforms;android-{}", api),
            SdkComponent::BuildTools(version) => format!("build-tools;{}", version),
            SdkComponent::PlatformTools => "platform-tools".to_string(),
        }
    }
}

/// One sdkmanager invocation of the install sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkStep {
    AcceptLicenses,
    Install(SdkComponent),
}

impl SdkStep {
    /// Command-line arguments after `--sdk_root`
    pub fn args(&self) -> Vec<String> {
        match self {
            SdkStep::AcceptLicenses => vec!["--licenses".to_string()],
            SdkStep::Install(component) => vec!["--install".to_string(), component.package_name()],
        }
    }
}

impl fmt::Display for SdkStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdkStep::AcceptLicenses => f.write_str("license acceptance"),
            SdkStep::Install(component) => write!(f, "install of {}", component.package_name()),
        }
    }
}

/// Everything an sdkmanager invocation needs to know about the run
#[derive(Debug, Clone)]
pub struct SdkInvocation {
    pub step: SdkStep,
    pub sdkmanager: PathBuf,
    pub sdk_root: PathBuf,
    pub user_home: PathBuf,
}

/// Runs one sdkmanager step; exit status is the only success signal
pub trait SdkDriver {
    fn run(&self, invocation: &SdkInvocation) -> impl Future<Output = Result<(), ProvisionError>> + Send;
}

/// Path of the sdkmanager launcher inside an extracted command-line tools tree
pub fn sdkmanager_path(tools_dir: &Path) -> PathBuf {
    let exe_name = if cfg!(windows) { "sdkmanager.bat" } else { "sdkmanager" };
    tools_dir.join("bin").join(exe_name)
}

/// Create the isolated user home and the empty `repositories.cfg` that
/// sdkmanager warns about on first run. Existing files are left alone.
pub async fn prepare_user_home(user_home: &Path) -> Result<(), ProvisionError> {
    for dir in [user_home.to_path_buf(), user_home.join(".android")] {
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ProvisionError::io(format!("Failed to create {:?}", dir), e))?;

        let cfg = dir.join("repositories.cfg");
        let exists = tokio::fs::try_exists(&cfg)
            .await
            .map_err(|e| ProvisionError::io(format!("Failed to stat {:?}", cfg), e))?;
        if !exists {
            debug!("Creating empty {:?}", cfg);
            tokio::fs::write(&cfg, b"")
                .await
                .map_err(|e| ProvisionError::io(format!("Failed to create {:?}", cfg), e))?;
        }
    }
    Ok(())
}

/// Android SDK Manager wrapper
#[derive(Debug, Clone, Default)]
pub struct SdkManager {
    java_home: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl SdkManager {
    /// Create a new SDK manager without timeout or explicit JDK
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JAVA_HOME for SDK manager operations
    pub fn with_java_home(mut self, java_home: Option<PathBuf>) -> Self {
        self.java_home = java_home;
        self
    }

    /// Kill an invocation that runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create the base command with environment variables
    fn create_command(&self, invocation: &SdkInvocation) -> Command {
        let mut cmd = Command::new(&invocation.sdkmanager);

        cmd.arg(format!("--sdk_root={}", invocation.sdk_root.display()));
        cmd.args(invocation.step.args());

        cmd.env("ANDROID_HOME", &invocation.sdk_root);
        cmd.env("ANDROID_SDK_ROOT", &invocation.sdk_root);
        cmd.env("ANDROID_USER_HOME", &invocation.user_home);
        cmd.env("ANDROID_SDK_HOME", &invocation.user_home);
        cmd.env("ANDROID_PREFS_ROOT", &invocation.user_home);

        if let Some(java_home) = &self.java_home {
            cmd.env("JAVA_HOME", java_home);
        }

        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
        cmd
    }

    async fn execute(&self, invocation: &SdkInvocation) -> Result<(), ProvisionError> {
        let step = &invocation.step;
        info!("Running sdkmanager {}", step);

        prepare_user_home(&invocation.user_home).await?;

        let mut cmd = self.create_command(invocation);
        let answers_prompts = *step == SdkStep::AcceptLicenses;
        cmd.stdin(if answers_prompts { Stdio::piped() } else { Stdio::null() });

        let mut child = cmd.spawn().map_err(|source| ProvisionError::Spawn {
            step: step.clone(),
            source,
        })?;

        // Keep saying yes until sdkmanager stops reading
        let feeder = child.stdin.take().map(|mut stdin| {
            tokio::spawn(async move {
                while stdin.write_all(b"y\n").await.is_ok() {}
            })
        });
        let stdout = child.stdout.take().map(|out| tokio::spawn(drain_lines(out, "stdout")));
        let stderr = child.stderr.take().map(|err| tokio::spawn(drain_lines(err, "stderr")));

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    warn!("sdkmanager {} timed out after {:?}, killing it", step, limit);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill sdkmanager: {}", e);
                    }
                    abort_all([feeder, stdout, stderr]);
                    return Err(ProvisionError::SubprocessTimeout {
                        step: step.clone(),
                        secs: limit.as_secs(),
                    });
                }
            },
            None => child.wait().await,
        }
        .map_err(|e| ProvisionError::io(format!("Failed to wait for sdkmanager {}", step), e))?;

        if let Some(feeder) = feeder {
            feeder.abort();
        }
        for reader in [stdout, stderr].into_iter().flatten() {
            let _ = reader.await;
        }

        if !status.success() {
            return Err(ProvisionError::Subprocess {
                step: step.clone(),
                status: status.to_string(),
            });
        }

        info!("sdkmanager {} finished", step);
        Ok(())
    }
}

impl SdkDriver for SdkManager {
    fn run(&self, invocation: &SdkInvocation) -> impl Future<Output = Result<(), ProvisionError>> + Send {
        self.execute(invocation)
    }
}

async fn drain_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!("sdkmanager {}: {}", stream, line);
    }
}

fn abort_all<const N: usize>(tasks: [Option<tokio::task::JoinHandle<()>>; N]) {
    for task in tasks.into_iter().flatten() {
        task.abort();
    }
}
