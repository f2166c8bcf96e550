//! Toolchain Request
//!
//! The immutable input of a provisioning run and its validation rules.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sdkprov_core::{ConsumerRole, HostArch, HostOs, Platform, ProvisionerConfig};

use crate::error::ConfigurationError;
use crate::{MAX_API_LEVEL, MIN_API_LEVEL};

/// What to provision and for which build host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainRequest {
    platform_api_level: u32,
    build_tools_revision: String,
    host_os: HostOs,
    host_arch: HostArch,
}

impl ToolchainRequest {
    pub fn new(
        platform_api_level: u32,
        build_tools_revision: impl Into<String>,
        host_os: HostOs,
        host_arch: HostArch,
    ) -> Self {
        Self {
            platform_api_level,
            build_tools_revision: build_tools_revision.into(),
            host_os,
            host_arch,
        }
    }

    /// Build the request from configuration, resolving the platform for `role`
    pub fn from_config(
        config: &ProvisionerConfig,
        role: ConsumerRole,
    ) -> Result<Self, ConfigurationError> {
        let Platform { os, arch } = config.resolve_platform(role)?;
        Ok(Self::new(
            config.sdk.platform_version,
            config.sdk.build_tools_revision.clone(),
            os,
            arch,
        ))
    }

    pub fn platform_api_level(&self) -> u32 {
        self.platform_api_level
    }

    pub fn build_tools_revision(&self) -> &str {
        &self.build_tools_revision
    }

    pub fn host_os(&self) -> &HostOs {
        &self.host_os
    }

    pub fn host_arch(&self) -> &HostArch {
        &self.host_arch
    }

    /// Reject unsupported API levels, operating systems and architectures.
    /// Performs no I/O.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(MIN_API_LEVEL..=MAX_API_LEVEL).contains(&self.platform_api_level) {
            return Err(ConfigurationError::ApiLevelOutOfRange {
                level: self.platform_api_level,
                min: MIN_API_LEVEL,
                max: MAX_API_LEVEL,
            });
        }
        if !self.host_os.is_supported() {
            return Err(ConfigurationError::UnsupportedOs(self.host_os.to_string()));
        }
        if self.host_arch != HostArch::X86_64 {
            return Err(ConfigurationError::UnsupportedArch(
                self.host_arch.to_string(),
            ));
        }
        Ok(())
    }

    /// Content address of the package this request produces
    pub fn package_id(&self, cmdline_tools_version: &str) -> String {
        let level = self.platform_api_level.to_string();
        let mut hasher = Sha256::new();
        for part in [
            cmdline_tools_version,
            self.host_os.as_str(),
            self.host_arch.as_str(),
            level.as_str(),
            self.build_tools_revision.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let digest = hex::encode(hasher.finalize());
        digest[..16].to_string()
    }
}

impl std::fmt::Display for ToolchainRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "android-{} / build-tools {} on {}/{}",
            self.platform_api_level, self.build_tools_revision, self.host_os, self.host_arch
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux(level: u32) -> ToolchainRequest {
        ToolchainRequest::new(level, "28.0.3", HostOs::Linux, HostArch::X86_64)
    }

    #[test]
    fn test_api_level_bounds() {
        assert!(linux(7).validate().is_ok());
        assert!(linux(32).validate().is_ok());

        for level in [0, 6, 33, 99] {
            let err = linux(level).validate().unwrap_err();
            assert!(matches!(err, ConfigurationError::ApiLevelOutOfRange { .. }));
            let message = err.to_string();
            assert!(message.contains(&level.to_string()));
            assert!(message.contains("[7 ... 32]"));
        }
    }

    #[test]
    fn test_unsupported_os_regardless_of_other_fields() {
        for (level, revision) in [(24, "28.0.3"), (7, "30.0.0"), (32, "anything")] {
            let request = ToolchainRequest::new(
                level,
                revision,
                HostOs::Other("FreeBSD".into()),
                HostArch::X86_64,
            );
            let err = request.validate().unwrap_err();
            assert_eq!(
                err.to_string(),
                "Unsupported build os: FreeBSD. Supported are: Windows, Macos, Linux"
            );
        }
    }

    #[test]
    fn test_unsupported_arch_regardless_of_os() {
        for os in [HostOs::Windows, HostOs::Macos, HostOs::Linux] {
            let request = ToolchainRequest::new(24, "28.0.3", os, HostArch::Armv8);
            let err = request.validate().unwrap_err();
            assert_eq!(
                err.to_string(),
                "Unsupported build arch: armv8. Supported is: x86_64"
            );
        }
    }

    #[test]
    fn test_package_id_depends_on_every_field() {
        let base = linux(24).package_id("latest");
        assert_eq!(base.len(), 16);
        assert_eq!(base, linux(24).package_id("latest"));
        assert_ne!(base, linux(25).package_id("latest"));
        assert_ne!(base, linux(24).package_id("11076708"));
        assert_ne!(
            base,
            ToolchainRequest::new(24, "30.0.3", HostOs::Linux, HostArch::X86_64).package_id("latest")
        );
    }

    #[test]
    fn test_from_config() {
        let mut config = ProvisionerConfig::default();
        config.auto_detect = false;
        config.host.os = Some(HostOs::Macos);
        config.host.arch = Some(HostArch::X86_64);
        config.sdk.platform_version = 30;

        let request = ToolchainRequest::from_config(&config, ConsumerRole::Host).unwrap();
        assert_eq!(request.platform_api_level(), 30);
        assert_eq!(request.host_os(), &HostOs::Macos);
        assert!(ToolchainRequest::from_config(&config, ConsumerRole::Build).is_err());
    }
}
