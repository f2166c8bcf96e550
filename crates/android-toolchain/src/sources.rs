//! Source Index
//!
//! Maps `(version, os, arch)` to the command-line tools archive to download.
//!
//! ```toml
//! [sources.latest.Linux.x86_64]
//! url = "https://dl.google.com/android/repository/commandlinetools-linux-11076708_latest.zip"
//! sha256 = "2d2d50857e4eb553af5a6dc3ad507a17adf43d115264b1afc116f95c92e5e258"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sdkprov_core::{HostArch, HostOs};

use crate::error::{FetchError, ProvisionError};

/// Archive container format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
    #[serde(rename = "tar")]
    Tar,
}

impl ArchiveFormat {
    /// Infer the format from a URL or file name
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name
            .split(['?', '#'])
            .next()
            .unwrap_or(name)
            .to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveFormat::Tar)
        } else {
            None
        }
    }
}

fn default_strip_root() -> bool {
    true
}

/// Where and how to fetch one archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArchiveFormat>,
    #[serde(default = "default_strip_root")]
    pub strip_root: bool,
}

impl SourceDescriptor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            sha256: None,
            format: None,
            strip_root: true,
        }
    }

    pub fn with_sha256(mut self, sha256: impl Into<String>) -> Self {
        self.sha256 = Some(sha256.into());
        self
    }

    pub fn with_format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Declared format, or the one implied by the URL
    pub fn archive_format(&self) -> Result<ArchiveFormat, FetchError> {
        self.format
            .or_else(|| ArchiveFormat::from_name(&self.url))
            .ok_or_else(|| FetchError::UnsupportedFormat(self.url.clone()))
    }
}

type ArchTable = BTreeMap<String, SourceDescriptor>;
type OsTable = BTreeMap<String, ArchTable>;

/// Version-indexed table of command-line tools archives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIndex {
    #[serde(default)]
    sources: BTreeMap<String, OsTable>,
}

impl SourceIndex {
    /// Index with the command-line tools published by Google
    pub fn builtin() -> Self {
        const BASE: &str = "https://dl.google.com/android/repository";
        let mut index = Self::default();
        index.insert(
            "latest",
            &HostOs::Windows,
            &HostArch::X86_64,
            SourceDescriptor::new(format!("{BASE}/commandlinetools-win-11076708_latest.zip"))
                .with_sha256("4d6931209eebb1bfb7c7e8b240a6a3cb3ab24479ea294f3539429574b1eec862"),
        );
        index.insert(
            "latest",
            &HostOs::Macos,
            &HostArch::X86_64,
            SourceDescriptor::new(format!("{BASE}/commandlinetools-mac-11076708_latest.zip"))
                .with_sha256("7bc5c72ba0275c80a8f19684fb92793b83e8e5234be12c7f8e6d42c5c9bd787d"),
        );
        index.insert(
            "latest",
            &HostOs::Linux,
            &HostArch::X86_64,
            SourceDescriptor::new(format!("{BASE}/commandlinetools-linux-11076708_latest.zip"))
                .with_sha256("2d2d50857e4eb553af5a6dc3ad507a17adf43d115264b1afc116f95c92e5e258"),
        );
        index
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, sdkprov_core::CoreError> {
        Ok(toml::from_str(contents)?)
    }

    /// Load an index file
    pub async fn load(path: &Path) -> Result<Self, ProvisionError> {
        debug!("Loading source index from {:?}", path);
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ProvisionError::io(format!("Failed to read source index {:?}", path), e))?;
        Ok(Self::from_toml_str(&contents)?)
    }

    pub fn insert(
        &mut self,
        version: impl Into<String>,
        os: &HostOs,
        arch: &HostArch,
        descriptor: SourceDescriptor,
    ) {
        self.sources
            .entry(version.into())
            .or_default()
            .entry(os.to_string())
            .or_default()
            .insert(arch.to_string(), descriptor);
    }

    /// Overlay `other` on this index; entries in `other` win
    pub fn merge(&mut self, other: SourceIndex) {
        for (version, oses) in other.sources {
            let target = self.sources.entry(version).or_default();
            for (os, arches) in oses {
                target.entry(os).or_default().extend(arches);
            }
        }
    }

    pub fn lookup(&self, version: &str, os: &HostOs, arch: &HostArch) -> Option<&SourceDescriptor> {
        self.sources
            .get(version)?
            .get(os.as_str())?
            .get(arch.as_str())
    }

    /// Like [`lookup`](Self::lookup), failing with `SourceNotFound`
    pub fn resolve(
        &self,
        version: &str,
        os: &HostOs,
        arch: &HostArch,
    ) -> Result<&SourceDescriptor, ProvisionError> {
        self.lookup(version, os, arch)
            .ok_or_else(|| ProvisionError::SourceNotFound {
                version: version.to_string(),
                os: os.to_string(),
                arch: arch.to_string(),
            })
    }

    /// Every entry as `(version, os, arch, descriptor)`
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str, &SourceDescriptor)> {
        self.sources.iter().flat_map(|(version, oses)| {
            oses.iter().flat_map(move |(os, arches)| {
                arches
                    .iter()
                    .map(move |(arch, d)| (version.as_str(), os.as_str(), arch.as_str(), d))
            })
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}
