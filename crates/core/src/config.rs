//! Provisioner Configuration
//!
//! Settings for a provisioning run:
//! - requested SDK versions
//! - host and build platform contexts
//! - working, package and index paths
//! - download and subprocess limits
//!
//! Platform settings are resolved once per consumer role through
//! [`FALLBACK_RULES`]. Each field is looked up in the listed sources in order.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::platform::{HostArch, HostOs, Platform};

/// How the provisioned SDK is going to be consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerRole {
    /// Used directly by the build that requested it
    #[default]
    Host,
    /// Used as a tool by a downstream build (cross-compilation)
    Build,
}

impl ConsumerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumerRole::Host => "host",
            ConsumerRole::Build => "build",
        }
    }
}

impl std::fmt::Display for ConsumerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a platform setting may come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    /// The `[host]` section
    Host,
    /// The `[build]` section
    Build,
    /// The running machine, when `auto_detect` is on
    Detected,
}

/// Lookup order for platform settings, per consumer role
pub const FALLBACK_RULES: &[(ConsumerRole, &[SettingsSource])] = &[
    (ConsumerRole::Host, &[SettingsSource::Host, SettingsSource::Detected]),
    (ConsumerRole::Build, &[SettingsSource::Build, SettingsSource::Detected]),
];

/// Requested SDK components
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SdkSettings {
    /// Android platform API level
    pub platform_version: u32,
    /// Build-tools revision, passed through as-is
    pub build_tools_revision: String,
    /// Command-line tools version key in the source index
    pub cmdline_tools_version: String,
}

impl Default for SdkSettings {
    fn default() -> Self {
        Self {
            platform_version: 24,
            build_tools_revision: "28.0.3".to_string(),
            cmdline_tools_version: "latest".to_string(),
        }
    }
}

/// Platform of one context; unset fields fall through to the next source
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ContextSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<HostOs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<HostArch>,
}

/// Filesystem locations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathSettings {
    /// Working directory of the run (extraction, installs, user home)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    /// Final package output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_dir: Option<PathBuf>,
    /// Additional source index merged over the built-in one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_index: Option<PathBuf>,
    /// JDK used to run sdkmanager
    #[serde(skip_serializing_if = "Option::is_none")]
    pub java_home: Option<PathBuf>,
}

/// Download behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadSettings {
    /// Verify SHA-256 when the index provides one
    pub verify_checksum: bool,
    /// HTTP timeout in seconds
    pub timeout_secs: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            timeout_secs: 300,
        }
    }
}

/// sdkmanager invocation limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SubprocessSettings {
    /// Per-invocation timeout in seconds, 0 to wait forever
    pub timeout_secs: u64,
}

impl Default for SubprocessSettings {
    fn default() -> Self {
        Self { timeout_secs: 1800 }
    }
}

impl SubprocessSettings {
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

/// Main provisioner configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Fall back to the running machine for unset platform settings
    pub auto_detect: bool,
    pub sdk: SdkSettings,
    pub host: ContextSettings,
    pub build: ContextSettings,
    pub paths: PathSettings,
    pub download: DownloadSettings,
    pub subprocess: SubprocessSettings,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            auto_detect: true,
            sdk: SdkSettings::default(),
            host: ContextSettings::default(),
            build: ContextSettings::default(),
            paths: PathSettings::default(),
            download: DownloadSettings::default(),
            subprocess: SubprocessSettings::default(),
        }
    }
}

impl ProvisionerConfig {
    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("dev", "sdkprov", "sdkprov")
    }

    /// Get the configuration file path
    pub fn config_file() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path (package outputs)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    /// Get the cache directory path (working directories)
    pub fn cache_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
    }

    /// Load configuration from the default location, writing defaults if missing
    pub async fn load() -> Result<Self> {
        let config_file = Self::config_file()
            .ok_or_else(|| CoreError::Config("Cannot determine config path".into()))?;

        if config_file.exists() {
            Self::load_from(&config_file).await
        } else {
            info!("Config file not found, using defaults");
            let config = ProvisionerConfig::default();
            config.save_to(&config_file).await?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", path);
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save configuration to a file, creating parent directories
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let contents = toml::to_string_pretty(self)?;
        tokio::fs::write(path, contents).await?;

        debug!("Config saved to {:?}", path);
        Ok(())
    }

    fn context(&self, source: SettingsSource) -> Option<&ContextSettings> {
        match source {
            SettingsSource::Host => Some(&self.host),
            SettingsSource::Build => Some(&self.build),
            SettingsSource::Detected => None,
        }
    }

    fn rules(role: ConsumerRole) -> &'static [SettingsSource] {
        FALLBACK_RULES
            .iter()
            .find(|(r, _)| *r == role)
            .map(|(_, sources)| *sources)
            .unwrap_or(&[])
    }

    /// Resolve the platform the SDK tools run on for the given role
    pub fn resolve_platform(&self, role: ConsumerRole) -> Result<Platform> {
        let sources = Self::rules(role);

        let os = sources.iter().find_map(|source| match source {
            SettingsSource::Detected if self.auto_detect => Some(HostOs::current()),
            SettingsSource::Detected => None,
            other => self.context(*other).and_then(|c| c.os.clone()),
        });
        let arch = sources.iter().find_map(|source| match source {
            SettingsSource::Detected if self.auto_detect => Some(HostArch::current()),
            SettingsSource::Detected => None,
            other => self.context(*other).and_then(|c| c.arch.clone()),
        });

        let os = os.ok_or(CoreError::MissingSetting {
            setting: "os",
            context: role.as_str(),
        })?;
        let arch = arch.ok_or(CoreError::MissingSetting {
            setting: "arch",
            context: role.as_str(),
        })?;

        debug!("Resolved {} platform: {}/{}", role, os, arch);
        Ok(Platform::new(os, arch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.sdk.platform_version, 24);
        assert_eq!(config.sdk.build_tools_revision, "28.0.3");
        assert!(config.download.verify_checksum);
        assert_eq!(
            config.subprocess.timeout(),
            Some(std::time::Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ProvisionerConfig::from_toml_str(
            "[sdk]\nplatform_version = 30\n\n[build]\nos = \"Linux\"\n",
        )
        .unwrap();
        assert_eq!(config.sdk.platform_version, 30);
        assert_eq!(config.sdk.build_tools_revision, "28.0.3");
        assert_eq!(config.build.os, Some(HostOs::Linux));
        assert_eq!(config.build.arch, None);
    }

    #[test]
    fn test_zero_timeout_disables() {
        let settings = SubprocessSettings { timeout_secs: 0 };
        assert_eq!(settings.timeout(), None);
    }

    #[test]
    fn test_role_uses_its_own_section() {
        let config = ProvisionerConfig {
            auto_detect: false,
            host: ContextSettings {
                os: Some(HostOs::Windows),
                arch: Some(HostArch::X86_64),
            },
            build: ContextSettings {
                os: Some(HostOs::Linux),
                arch: Some(HostArch::Armv8),
            },
            ..Default::default()
        };

        assert_eq!(
            config.resolve_platform(ConsumerRole::Host).unwrap(),
            Platform::new(HostOs::Windows, HostArch::X86_64)
        );
        assert_eq!(
            config.resolve_platform(ConsumerRole::Build).unwrap(),
            Platform::new(HostOs::Linux, HostArch::Armv8)
        );
    }

    #[test]
    fn test_fields_fall_back_independently() {
        let config = ProvisionerConfig {
            build: ContextSettings {
                os: Some(HostOs::Other("Solaris".into())),
                arch: None,
            },
            ..Default::default()
        };

        let platform = config.resolve_platform(ConsumerRole::Build).unwrap();
        assert_eq!(platform.os, HostOs::Other("Solaris".into()));
        assert_eq!(platform.arch, HostArch::current());
    }

    #[test]
    fn test_missing_setting_without_detection() {
        let config = ProvisionerConfig {
            auto_detect: false,
            host: ContextSettings {
                os: Some(HostOs::Linux),
                arch: None,
            },
            ..Default::default()
        };

        let err = config.resolve_platform(ConsumerRole::Host).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingSetting {
                setting: "arch",
                context: "host"
            }
        ));
        assert!(err.to_string().contains("[host]"));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = ProvisionerConfig::default();
        config.paths.java_home = Some(PathBuf::from("/opt/jdk8"));
        config.save_to(&path).await.unwrap();

        let loaded = ProvisionerConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }
}
