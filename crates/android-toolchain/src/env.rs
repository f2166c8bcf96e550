//! Environment Publisher
//!
//! Describes a packaged SDK to downstream consumers through environment
//! variables, and renders them as shell exports, dotenv, script or JSON.

use std::path::Path;

use sdkprov_core::ConsumerRole;
use tracing::info;

use crate::request::ToolchainRequest;

/// Variable names in publication order
const VAR_NAMES: [&str; 6] = [
    "ANDROID_HOME",
    "ANDROID_SDK",
    "ANDROID_SDK_ROOT",
    "ANDROID_USER_HOME",
    "ANDROID_SDK_BUILD_TOOLS_REVISION",
    "ANDROID_SDK_PLATFORM_VERSION",
];

/// Environment published for one consumer of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdkEnvironment {
    role: ConsumerRole,
    vars: Vec<(String, String)>,
}

impl SdkEnvironment {
    /// Build the variable set for a package rooted at `package_dir`.
    ///
    /// Build consumers get every name suffixed with `_BUILD`.
    pub fn publish(package_dir: &Path, request: &ToolchainRequest, role: ConsumerRole) -> Self {
        let root = package_dir.to_string_lossy().to_string();
        let user_home = package_dir.join("userhome").to_string_lossy().to_string();
        let values = [
            root.clone(),
            root.clone(),
            root,
            user_home,
            request.build_tools_revision().to_string(),
            request.platform_api_level().to_string(),
        ];

        let suffix = match role {
            ConsumerRole::Host => "",
            ConsumerRole::Build => "_BUILD",
        };
        let vars = VAR_NAMES
            .iter()
            .zip(values)
            .map(|(name, value)| (format!("{name}{suffix}"), value))
            .collect();

        Self { role, vars }
    }

    pub fn role(&self) -> ConsumerRole {
        self.role
    }

    /// Variables in publication order
    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Get shell export commands
    pub fn shell_exports(&self) -> String {
        let mut exports = String::new();
        for (key, value) in &self.vars {
            if cfg!(windows) {
                exports.push_str(&format!("set \"{}={}\"\n", key, value));
            } else {
                exports.push_str(&format!("export {}={}\n", key, shell_quote(value)));
            }
        }
        exports
    }

    /// `KEY=value` lines
    pub fn dotenv(&self) -> String {
        self.vars
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect()
    }

    /// JSON object keyed by variable name
    pub fn to_json(&self) -> serde_json::Result<String> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .vars
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect();
        serde_json::to_string_pretty(&map)
    }
}

/// Single-quote `value` for a POSIX shell; an embedded `'` becomes `'\''`
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Environment file writer
pub struct EnvFileWriter;

impl EnvFileWriter {
    /// Write a .env file
    pub async fn write_dotenv(path: &Path, env: &SdkEnvironment) -> std::io::Result<()> {
        let mut content = String::from("# Android SDK environment\n\n");
        content.push_str(&env.dotenv());

        tokio::fs::write(path, content).await?;
        info!("Wrote environment to {:?}", path);
        Ok(())
    }

    /// Write a shell script for environment setup
    pub async fn write_shell_script(path: &Path, env: &SdkEnvironment) -> std::io::Result<()> {
        let mut content = if cfg!(windows) {
            "@echo off\nREM Android SDK environment\n\n".to_string()
        } else {
            "#!/bin/sh\n# Android SDK environment\n\n".to_string()
        };
        content.push_str(&env.shell_exports());

        tokio::fs::write(path, content).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = tokio::fs::metadata(path).await?.permissions();
            perms.set_mode(0o755);
            tokio::fs::set_permissions(path, perms).await?;
        }

        info!("Wrote shell script to {:?}", path);
        Ok(())
    }
}
