//! Host platform identification and manifest tools-version compatibility.
//!
//! Deliberately does not shell out to any external toolchain: the compiler
//! this crate's output eventually feeds is an external collaborator (see
//! the build manifest generator), not something this process invokes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("invalid tools-version string: {0}")]
    VersionParseError(String),
}

/// Host platform triple, used when stamping build commands with `-target`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
    pub triple: String,
}

impl PlatformInfo {
    pub fn detect() -> Self {
        let os = std::env::consts::OS.to_string();
        let arch = std::env::consts::ARCH.to_string();

        let triple = match (os.as_str(), arch.as_str()) {
            ("macos", "aarch64") => "arm64-apple-macosx",
            ("macos", "x86_64") => "x86_64-apple-macosx",
            ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
            ("linux", "x86_64") => "x86_64-unknown-linux-gnu",
            _ => "unknown",
        };

        Self {
            os,
            arch,
            triple: triple.to_string(),
        }
    }

    pub fn cache_key(&self) -> String {
        format!("{}-{}", self.os, self.arch)
    }
}

/// A manifest's declared `tools-version`, e.g. `"5.9"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolsVersion {
    pub major: u32,
    pub minor: u32,
}

/// The tools-version this implementation understands. Manifests declaring a
/// newer version are rejected (see `ToolsVersion::check_compatible`).
pub const CURRENT_TOOLS_VERSION: ToolsVersion = ToolsVersion { major: 5, minor: 9 };

/// Tools-version at which product-dependency names must be explicit
/// (`package:product`) rather than inferred by name alone.
pub const EXPLICIT_PRODUCT_DEPENDENCY_TOOLS_VERSION: ToolsVersion =
    ToolsVersion { major: 5, minor: 2 };

impl ToolsVersion {
    pub fn parse(s: &str) -> Result<Self, PlatformError> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| PlatformError::VersionParseError(s.to_string()))?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Ok(Self { major, minor })
    }

    /// `Err` carries `(required, current)` for `ToolsVersionIncompatible`.
    pub fn check_compatible(&self) -> Result<(), (ToolsVersion, ToolsVersion)> {
        if *self > CURRENT_TOOLS_VERSION {
            Err((self.clone(), CURRENT_TOOLS_VERSION))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Display for ToolsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_detection() {
        let platform = PlatformInfo::detect();
        assert!(!platform.os.is_empty());
        assert!(!platform.arch.is_empty());
    }

    #[test]
    fn tools_version_rejects_newer_than_current() {
        let v = ToolsVersion::parse("6.0").unwrap();
        assert!(v.check_compatible().is_err());
    }

    #[test]
    fn tools_version_accepts_older_or_equal() {
        assert!(ToolsVersion::parse("5.9").unwrap().check_compatible().is_ok());
        assert!(ToolsVersion::parse("5.2").unwrap().check_compatible().is_ok());
    }

    #[test]
    fn product_dependency_explicitness_threshold() {
        let old = ToolsVersion::parse("5.0").unwrap();
        assert!(old < EXPLICIT_PRODUCT_DEPENDENCY_TOOLS_VERSION);
    }
}
