//! Host Platform
//!
//! Operating system and architecture of the machine the SDK tools run on.
//! Values keep unknown spellings around so they can be reported back verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Build host operating system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostOs {
    Windows,
    Macos,
    Linux,
    Other(String),
}

impl HostOs {
    /// Operating systems the Android command-line tools are published for
    pub const SUPPORTED: &'static [HostOs] = &[HostOs::Windows, HostOs::Macos, HostOs::Linux];

    /// Detect the running machine
    pub fn current() -> Self {
        Self::parse(std::env::consts::OS)
    }

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(self)
    }

    pub fn as_str(&self) -> &str {
        match self {
            HostOs::Windows => "Windows",
            HostOs::Macos => "Macos",
            HostOs::Linux => "Linux",
            HostOs::Other(name) => name,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "windows" | "win" | "win32" => HostOs::Windows,
            "macos" | "mac" | "darwin" | "osx" => HostOs::Macos,
            "linux" => HostOs::Linux,
            _ => HostOs::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostOs {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for HostOs {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<HostOs> for String {
    fn from(value: HostOs) -> Self {
        value.as_str().to_string()
    }
}

/// Build host CPU architecture
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum HostArch {
    X86_64,
    X86,
    Armv7,
    Armv8,
    Other(String),
}

impl HostArch {
    pub fn current() -> Self {
        Self::parse(std::env::consts::ARCH)
    }

    pub fn as_str(&self) -> &str {
        match self {
            HostArch::X86_64 => "x86_64",
            HostArch::X86 => "x86",
            HostArch::Armv7 => "armv7",
            HostArch::Armv8 => "armv8",
            HostArch::Other(name) => name,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "amd64" | "x64" => HostArch::X86_64,
            "x86" | "i386" | "i686" => HostArch::X86,
            "armv7" | "arm" => HostArch::Armv7,
            "armv8" | "aarch64" | "arm64" => HostArch::Armv8,
            _ => HostArch::Other(value.trim().to_string()),
        }
    }
}

impl fmt::Display for HostArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HostArch {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for HostArch {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<HostArch> for String {
    fn from(value: HostArch) -> Self {
        value.as_str().to_string()
    }
}

/// Operating system and architecture pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: HostOs,
    pub arch: HostArch,
}

impl Platform {
    pub fn new(os: HostOs, arch: HostArch) -> Self {
        Self { os, arch }
    }

    pub fn current() -> Self {
        Self::new(HostOs::current(), HostArch::current())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}
